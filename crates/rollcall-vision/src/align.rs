//! Face alignment for ArcFace: similarity transform onto the canonical
//! 112×112 landmark layout.

/// ArcFace reference landmark positions in the 112×112 crop
/// (left eye, right eye, nose, left mouth, right mouth).
const REFERENCE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: usize = 112;

/// 4-DOF similarity transform: rotation+scale (a, b) and translation.
///
/// Maps `(x, y)` to `(a*x - b*y + tx, b*x + a*y + ty)`.
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    const IDENTITY: Similarity = Similarity {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares fit mapping `src` landmarks onto `dst`.
    ///
    /// Each point pair contributes two rows to an overdetermined system in
    /// (a, b, tx, ty); the normal equations are solved directly.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for i in 0..5 {
            let (sx, sy) = src[i];
            let (dx, dy) = dst[i];
            let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
            for (row, rhs) in rows {
                for j in 0..4 {
                    for k in 0..4 {
                        ata[j][k] += row[j] * row[k];
                    }
                    atb[j] += row[j] * rhs;
                }
            }
        }

        match solve4(ata, atb) {
            Some([a, b, tx, ty]) => Similarity { a, b, tx, ty },
            None => Similarity::IDENTITY,
        }
    }

    /// Inverse mapping from destination space back to source space.
    fn pull_back(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = x - self.tx;
        let dy = y - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (self.a * dy - self.b * dx) / det,
        ))
    }
}

/// Gaussian elimination with partial pivoting on a 4×4 system.
fn solve4(mut m: [[f32; 4]; 4], mut rhs: [f32; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let mut acc = rhs[i];
        for j in (i + 1)..4 {
            acc -= m[i][j] * x[j];
        }
        x[i] = acc / m[i][i];
    }
    Some(x)
}

/// Warp an RGB frame into the canonical 112×112 aligned face crop.
///
/// Bilinear sampling per channel; pixels that pull back to outside the
/// source frame come out black.
pub fn align_face(
    rgb: &[u8],
    width: u32,
    height: u32,
    landmarks: &[(f32, f32); 5],
) -> Vec<u8> {
    let transform = Similarity::fit(landmarks, &REFERENCE_112);
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE * 3];

    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let Some((sx, sy)) = transform.pull_back(ox as f32, oy as f32) else {
                continue;
            };

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..3 {
                let sample = |x: i32, y: i32| -> f32 {
                    if x >= 0 && (x as usize) < w && y >= 0 && (y as usize) < h {
                        rgb[(y as usize * w + x as usize) * 3 + c] as f32
                    } else {
                        0.0
                    }
                };

                let value = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1) * fx * fy;

                out[(oy * ALIGNED_SIZE + ox) * 3 + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_reference_onto_itself_is_identity() {
        let t = Similarity::fit(&REFERENCE_112, &REFERENCE_112);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_fit_recovers_half_scale() {
        // Landmarks at double size should fit with scale ~0.5.
        let doubled: [(f32, f32); 5] =
            std::array::from_fn(|i| (REFERENCE_112[i].0 * 2.0, REFERENCE_112[i].1 * 2.0));
        let t = Similarity::fit(&doubled, &REFERENCE_112);
        assert!((t.a - 0.5).abs() < 0.05, "a = {}", t.a);
    }

    #[test]
    fn test_pull_back_inverts_forward_map() {
        let t = Similarity {
            a: 0.8,
            b: 0.3,
            tx: 12.0,
            ty: -4.0,
        };
        let (x, y) = (40.0f32, 25.0f32);
        let fx = t.a * x - t.b * y + t.tx;
        let fy = t.b * x + t.a * y + t.ty;
        let (bx, by) = t.pull_back(fx, fy).unwrap();
        assert!((bx - x).abs() < 1e-3);
        assert!((by - y).abs() < 1e-3);
    }

    #[test]
    fn test_align_output_dimensions() {
        let rgb = vec![128u8; 640 * 480 * 3];
        let aligned = align_face(&rgb, 640, 480, &REFERENCE_112);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE * 3);
    }

    #[test]
    fn test_bright_patch_lands_at_reference_position() {
        // Paint a green patch at the source left-eye landmark; after
        // alignment it must show up near the reference left-eye position.
        let (w, h) = (200usize, 200usize);
        let mut rgb = vec![0u8; w * h * 3];
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let (ex, ey) = (src[0].0 as usize, src[0].1 as usize);
        for dy in 0..5 {
            for dx in 0..5 {
                let px = ex - 2 + dx;
                let py = ey - 2 + dy;
                rgb[(py * w + px) * 3 + 1] = 255;
            }
        }

        let aligned = align_face(&rgb, w as u32, h as u32, &src);

        let rx = REFERENCE_112[0].0.round() as usize;
        let ry = REFERENCE_112[0].1.round() as usize;
        let mut brightest = 0u8;
        for dy in 0..3 {
            for dx in 0..3 {
                let x = rx - 1 + dx;
                let y = ry - 1 + dy;
                brightest = brightest.max(aligned[(y * ALIGNED_SIZE + x) * 3 + 1]);
            }
        }
        assert!(brightest > 100, "green patch missing near ({rx}, {ry})");
    }
}

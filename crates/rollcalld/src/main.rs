use anyhow::Result;
use rollcall_core::FaceProvider;
use rollcall_store::{AttendanceDb, GalleryStore};
use rollcall_vision::OnnxFaceAnalyzer;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod bus;
mod config;
mod reconcile;
mod service;
mod session;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        galleries = %config.gallery_dir.display(),
        tolerance = config.tolerance,
        "rollcalld starting"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = AttendanceDb::open(&config.db_path).await?;
    let galleries = Arc::new(GalleryStore::new(&config.gallery_dir));

    // Fail fast: without models there is nothing this daemon can do.
    let analyzer = OnnxFaceAnalyzer::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )?;
    tracing::info!(model_dir = %config.model_dir.display(), "face models loaded");
    let provider: Arc<dyn FaceProvider> = Arc::new(analyzer);

    let sessions = session::SessionStore::new(galleries, provider, config.tolerance);
    let service = Arc::new(service::AttendanceService::new(sessions, db));

    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Attendance1")?
        .serve_at(
            "/org/rollcall/Attendance1",
            bus::AttendanceBus::new(service),
        )?
        .build()
        .await?;
    tracing::info!("rollcalld ready on org.rollcall.Attendance1");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");
    Ok(())
}

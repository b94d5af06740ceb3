//! rollcall-store — Storage for the attendance system.
//!
//! Two resources live here: the per-class gallery files consumed by live
//! recognition (and written by enrollment), and the SQLite store holding the
//! student roster, the timetable, and append-only attendance records.

pub mod db;
pub mod gallery;

pub use db::{AttendanceDb, StoreError, TodaySummary};
pub use gallery::{GalleryStore, GALLERY_FORMAT_VERSION};

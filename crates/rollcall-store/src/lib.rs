//! rollcall-store — SQLite-backed persistence for the attendance kiosk.
//!
//! Two tables in one database: the gallery (identity → reference
//! embedding, rebuilt from a dataset directory) and the append-only
//! attendance log with the check-in/check-out decision logic.

pub mod attendance;
pub mod db;
pub mod gallery;

pub use attendance::{AlternationPolicy, AttendanceRecord, EventKind};
pub use db::{open, open_in_memory, StoreError};
pub use gallery::{Aggregation, GenerateError};

//! Metadata helpers: crash-safe snapshots and capture-time lookup.

pub mod atomic;
pub mod capture;

pub use atomic::{read_snapshot, sibling_with_suffix, write_snapshot};
pub use capture::{CaptureTimeSource, ExiftoolCaptureTime, MetadataUnavailable, NoCaptureTime};

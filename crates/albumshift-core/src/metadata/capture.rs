//! Embedded capture-time lookup.
//!
//! The catalog builder asks a `CaptureTimeSource` for each asset's capture
//! timestamp. Any failure degrades to "unknown"; it never drops the asset.

use chrono::NaiveDateTime;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// The capture time could not be determined.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("capture time not available: {reason}")]
pub struct MetadataUnavailable {
    pub reason: String,
}

impl MetadataUnavailable {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Reads the embedded capture timestamp of a media file.
pub trait CaptureTimeSource: Send + Sync {
    fn capture_time(&self, path: &Path) -> Result<NaiveDateTime, MetadataUnavailable>;
}

/// Source that never knows a capture time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptureTime;

impl CaptureTimeSource for NoCaptureTime {
    fn capture_time(&self, _path: &Path) -> Result<NaiveDateTime, MetadataUnavailable> {
        Err(MetadataUnavailable::new("no metadata extractor configured"))
    }
}

/// Reads `DateTimeOriginal` through the `exiftool` command-line tool.
#[derive(Debug, Clone)]
pub struct ExiftoolCaptureTime {
    program: String,
}

const EXIFTOOL_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl Default for ExiftoolCaptureTime {
    fn default() -> Self {
        Self {
            program: "exiftool".to_string(),
        }
    }
}

impl ExiftoolCaptureTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific exiftool binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl CaptureTimeSource for ExiftoolCaptureTime {
    fn capture_time(&self, path: &Path) -> Result<NaiveDateTime, MetadataUnavailable> {
        let output = Command::new(&self.program)
            .args(["-s3", "-d", EXIFTOOL_DATE_FORMAT, "-DateTimeOriginal"])
            .arg(path)
            .output()
            .map_err(|e| MetadataUnavailable::new(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(MetadataUnavailable::new(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout.trim();
        if value.is_empty() {
            return Err(MetadataUnavailable::new("no DateTimeOriginal tag"));
        }

        debug!("exiftool capture time for {}: {}", path.display(), value);
        parse_exiftool_date(value)
    }
}

fn parse_exiftool_date(value: &str) -> Result<NaiveDateTime, MetadataUnavailable> {
    NaiveDateTime::parse_from_str(value, EXIFTOOL_DATE_FORMAT)
        .map_err(|e| MetadataUnavailable::new(format!("unparsable timestamp {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capture_time_is_unavailable() {
        assert!(NoCaptureTime.capture_time(Path::new("/x.jpg")).is_err());
    }

    #[test]
    fn test_missing_exiftool_degrades() {
        let source = ExiftoolCaptureTime::with_program("/definitely/not/exiftool");
        let err = source.capture_time(Path::new("/x.jpg")).unwrap_err();
        assert!(err.reason.contains("cannot run"));
    }

    #[test]
    fn test_parse_exiftool_date() {
        let parsed = parse_exiftool_date("2014-07-04T18:30:05").unwrap();
        assert_eq!(parsed.to_string(), "2014-07-04 18:30:05");
        assert!(parse_exiftool_date("0000:00:00 00:00:00").is_err());
    }
}

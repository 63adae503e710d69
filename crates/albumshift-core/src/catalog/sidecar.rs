//! Per-asset JSON sidecars (titles, descriptions, tags, capture dates,
//! coordinates, license).

use crate::error::BuildError;
use crate::plan::GeoLocation;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::Path;

const SIDECAR_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Deserialize)]
struct RawSidecar {
    #[serde(default, alias = "name")]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<RawTag>>,
    #[serde(default)]
    date_taken: Option<String>,
    #[serde(default)]
    latitude: Option<RawNumber>,
    #[serde(default)]
    longitude: Option<RawNumber>,
    #[serde(default)]
    license: Option<String>,
}

/// Exports write coordinates either as numbers or as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn value(&self) -> Option<f64> {
        match self {
            RawNumber::Number(n) => Some(*n),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTag {
    Plain(String),
    Object { tag: String },
}

/// Descriptive metadata recovered from a sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarInfo {
    pub caption: Option<String>,
    pub tags: Vec<String>,
    pub date_taken: Option<NaiveDateTime>,
    pub location: Option<GeoLocation>,
    pub license: Option<String>,
}

/// Read and interpret a sidecar file.
pub fn read_sidecar(path: &Path) -> Result<SidecarInfo, BuildError> {
    let text = std::fs::read_to_string(path).map_err(|e| BuildError::Sidecar {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_sidecar(&text).map_err(|message| BuildError::Sidecar {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_sidecar(text: &str) -> Result<SidecarInfo, String> {
    let raw: RawSidecar = serde_json::from_str(text).map_err(|e| e.to_string())?;

    let title = non_blank(raw.title);
    let description = non_blank(raw.description);
    let caption = match (title, description) {
        (Some(t), Some(d)) => Some(format!("{}\n{}", t, d)),
        (t, d) => t.or(d),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw.tags.unwrap_or_default() {
        let value = match tag {
            RawTag::Plain(s) | RawTag::Object { tag: s } => s.trim().to_string(),
        };
        if !value.is_empty() && !tags.contains(&value) {
            tags.push(value);
        }
    }

    // An odd date is not worth rejecting the whole sidecar over.
    let date_taken = raw
        .date_taken
        .as_deref()
        .and_then(|d| NaiveDateTime::parse_from_str(d.trim(), SIDECAR_DATE_FORMAT).ok());

    // Both coordinates or neither; out-of-range pairs are dropped like odd dates.
    let location = match (raw.latitude.as_ref(), raw.longitude.as_ref()) {
        (Some(lat), Some(lon)) => lat
            .value()
            .zip(lon.value())
            .and_then(|(lat, lon)| GeoLocation::new(lat, lon)),
        _ => None,
    };

    Ok(SidecarInfo {
        caption,
        tags,
        date_taken,
        location,
        license: non_blank(raw.license),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

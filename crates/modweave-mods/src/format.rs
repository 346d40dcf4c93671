//! File formats understood by the reader and writer mods

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Supported tabular file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma (or other delimiter) separated values with a header row
    Csv,
    /// A JSON array of objects
    Json,
    /// One JSON object per line
    Jsonl,
}

impl FileFormat {
    /// Values accepted by the `format` parameter
    pub const NAMES: [&'static str; 3] = ["csv", "json", "jsonl"];

    /// Use `explicit` if given, otherwise infer from the file extension
    pub fn resolve(explicit: Option<&str>, path: &Path) -> Result<Self> {
        if let Some(name) = explicit {
            return Self::parse(name).ok_or_else(|| {
                Error::param("format", format!("unsupported format '{name}'"))
            });
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            _ => Err(Error::param(
                "format",
                format!("cannot infer format from '{}'; set format explicitly", path.display()),
            )),
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => f.write_str("csv"),
            Self::Json => f.write_str("json"),
            Self::Jsonl => f.write_str("jsonl"),
        }
    }
}

/// Single-byte delimiter from the `delimiter` parameter
pub(crate) fn delimiter(value: Option<&str>) -> Result<u8> {
    match value.unwrap_or(",") {
        "\\t" | "\t" => Ok(b'\t'),
        d if d.len() == 1 => Ok(d.as_bytes()[0]),
        d => Err(Error::param(
            "delimiter",
            format!("must be a single character, got '{d}'"),
        )),
    }
}

//! Error types for modweave-mods

use thiserror::Error;

/// Result type alias for built-in mod operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the built-in mods while running
#[derive(Error, Debug)]
pub enum Error {
    /// A parameter is missing or has an unusable value
    #[error("parameter '{name}': {message}")]
    InvalidParam {
        /// Parameter name
        name: String,
        /// Description of the problem
        message: String,
    },

    /// A file's contents do not match its declared format
    #[error("cannot read {path} as {format}: {message}")]
    Format {
        /// File path
        path: String,
        /// Declared or inferred format
        format: String,
        /// Description of the problem
        message: String,
    },

    /// A row transform could not be applied
    #[error("transform error in '{transform}': {message}")]
    Transform {
        /// Name of the transform
        transform: String,
        /// Description of the error
        message: String,
    },

    /// Failure from the core result builder
    #[error(transparent)]
    Core(#[from] modweave_core::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn param(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

//! Runtime error types

/// Result type alias for runtime operations
pub type Result<T> = anyhow::Result<T>;

/// Error type for runtime operations
pub type Error = anyhow::Error;

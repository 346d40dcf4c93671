//! Error types for modweave-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modweave-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in modweave-core
#[derive(Error, Debug)]
pub enum Error {
    /// An argument was empty or otherwise unusable
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what's invalid
        message: String,
    },

    /// Substitution needed a context document but none was set
    #[error("no context file set - call set_context() first")]
    ContextNotSet,

    /// The context file could not be loaded
    #[error("context file {}: {reason}", .path.display())]
    ContextFile {
        /// Resolved path of the context file
        path: PathBuf,
        /// Why loading failed
        reason: ContextFailure,
    },

    /// A `${...}` reference could not be resolved against the context
    #[error("context variable not found: {reference} - {detail}")]
    VariableNotFound {
        /// The exact reference as written, e.g. `${db.port}`
        reference: String,
        /// Which segment failed and why
        detail: String,
    },

    /// The project defaults file exists but is malformed or unreadable
    #[error("invalid project config {}: {message}", .path.display())]
    ProjectConfig {
        /// Path of the project defaults file
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// Project defaults could not be merged with job parameters
    #[error("parameter resolution failed: {source}")]
    Resolution {
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// One or more required parameters were not supplied
    #[error("Missing required parameters: {}", .names.join(", "))]
    MissingParameters {
        /// Every missing parameter name, sorted
        names: Vec<String>,
    },

    /// A supplied parameter does not satisfy its declared type or enum
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Description of the mismatch
        message: String,
    },

    /// A config schema declaration is malformed
    #[error("invalid config schema: {message}")]
    InvalidSchema {
        /// Description of the problem
        message: String,
    },

    /// Mod metadata is malformed
    #[error("invalid mod metadata: {message}")]
    InvalidMetadata {
        /// Description of the problem
        message: String,
    },

    /// Mod type is not registered
    #[error("Mod '{mod_type}' not found in registry. Available mods: [{}]", .available.join(", "))]
    NotFound {
        /// Requested mod type
        mod_type: String,
        /// Registered mod types
        available: Vec<String>,
    },

    /// The stored entry for a mod type could not be parsed
    #[error("Mod '{mod_type}' entry malformed: {reason}")]
    MalformedEntry {
        /// Mod type the entry is stored under
        mod_type: String,
        /// Parse error for the entry
        reason: String,
    },

    /// Mod type is already registered
    #[error("Mod type '{mod_type}' already registered")]
    AlreadyRegistered {
        /// Conflicting mod type
        mod_type: String,
    },

    /// A mod implementation could not be resolved or declares bad metadata
    #[error("invalid mod '{module_path}': {message}")]
    InvalidMod {
        /// Module path the mod was referenced by
        module_path: String,
        /// Description of the problem
        message: String,
    },

    /// The registry file does not have the expected shape
    #[error("invalid registry file {}: {message}", .path.display())]
    RegistryFormat {
        /// Registry file path
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// The registry could not be written back to disk
    #[error("failed to save registry {}: {source}", .path.display())]
    Persistence {
        /// Registry file path
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Reason a context file failed to load
#[derive(Error, Debug)]
pub enum ContextFailure {
    /// Nothing exists at the path
    #[error("not found")]
    NotFound,

    /// The path exists but is a directory or special file
    #[error("path is not a file")]
    NotAFile,

    /// The file exists but could not be read
    #[error("cannot read file: {0}")]
    Unreadable(std::io::Error),

    /// The file is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    /// The file is valid JSON but its top level is not an object
    #[error("must contain a JSON object")]
    NotAnObject,
}

//! Project defaults discovery and loading
//!
//! A project keeps shared parameter defaults in a `project_defaults.yaml`
//! file at its root. Jobs usually live one directory below it, so discovery
//! checks the parent of the starting directory first.
//!
//! ```yaml
//! project_name: sales_etl
//! project_version: 1.2.0
//! mod_defaults:
//!   file_reader:
//!     delimiter: ","
//! globals:
//!   env: dev
//! ```

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::params::Params;

/// File name searched for during discovery
pub const PROJECT_DEFAULTS_FILE: &str = "project_defaults.yaml";

/// Project-level configuration from `project_defaults.yaml`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectConfig {
    /// Project name; defaults to the name of the directory holding the file
    pub project_name: Option<String>,

    /// Project version
    pub project_version: Option<String>,

    /// Directory the defaults file was found in
    pub base_path: Option<PathBuf>,

    mod_defaults: Map<String, Value>,
    globals: Map<String, Value>,
}

impl ProjectConfig {
    /// Configuration with no defaults, used when no file is found
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look for the defaults file in the parent of `start_dir`, then in
    /// `start_dir` itself.
    ///
    /// # Errors
    ///
    /// Fails only when a file is found but cannot be read or parsed.
    /// No file at either location yields [`ProjectConfig::empty`].
    pub fn discover<P: AsRef<Path>>(start_dir: P) -> Result<Self> {
        let start_dir = start_dir.as_ref();
        let start_dir = std::path::absolute(start_dir).unwrap_or_else(|_| start_dir.to_path_buf());

        let candidates = [
            start_dir.parent().map(|p| p.join(PROJECT_DEFAULTS_FILE)),
            Some(start_dir.join(PROJECT_DEFAULTS_FILE)),
        ];

        match candidates.into_iter().flatten().find(|p| p.is_file()) {
            Some(path) => Self::load(path),
            None => {
                tracing::info!("No project configuration found, using defaults only");
                Ok(Self::empty())
            }
        }
    }

    /// Load a specific defaults file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = ProjectConfig::load("./project_defaults.yaml")?;
    /// println!("Project: {:?}", config.project_name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |message: String| Error::ProjectConfig {
            path: path.to_path_buf(),
            message,
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read file: {e}")))?;
        let parsed: Value = serde_yaml::from_str(&contents)
            .map_err(|e| invalid(format!("invalid YAML: {e}")))?;

        let mut root = match parsed {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => return Err(invalid("must contain a YAML mapping".to_string())),
        };

        let base_path = path.parent().map(Path::to_path_buf);
        let project_name = match root.remove("project_name") {
            Some(Value::String(name)) => Some(name),
            Some(Value::Null) | None => base_path
                .as_deref()
                .and_then(|p| std::path::absolute(p).ok())
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned())),
            Some(other) => Some(other.to_string()),
        };
        let project_version = match root.remove("project_version") {
            Some(Value::String(version)) => Some(version),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let config = Self {
            project_name,
            project_version,
            base_path,
            mod_defaults: object_or_empty(root.remove("mod_defaults"), "mod_defaults"),
            globals: object_or_empty(root.remove("globals"), "globals"),
        };
        tracing::info!(path = %path.display(), "Found project config");
        Ok(config)
    }

    /// Defaults declared for one mod type; empty if none are declared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `mod_type` is empty.
    pub fn mod_defaults(&self, mod_type: &str) -> Result<Params> {
        let mod_type = mod_type.trim();
        if mod_type.is_empty() {
            return Err(Error::invalid_argument("mod_type must be a non-empty string"));
        }

        match self.mod_defaults.get(mod_type) {
            Some(Value::Object(defaults)) => Ok(defaults.clone()),
            Some(Value::Null) | None => Ok(Params::new()),
            Some(_) => {
                tracing::warn!(mod_type, "mod_defaults entry is not a mapping, ignoring");
                Ok(Params::new())
            }
        }
    }

    /// Project-wide global settings
    pub fn globals(&self) -> Params {
        self.globals.clone()
    }
}

fn object_or_empty(value: Option<Value>, section: &str) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            tracing::warn!(section, "project config section is not a mapping, ignoring");
            Map::new()
        }
    }
}

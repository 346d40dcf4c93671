//! The standard execution result envelope
//!
//! Mods build their result incrementally with [`ModResult`] and finish it
//! with exactly one of [`ModResult::success`], [`ModResult::warning`] or
//! [`ModResult::error`]. Finalizing consumes the builder, so a result cannot
//! be finalized twice.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Clean success
pub const SUCCESS: u8 = 0;
/// Success with warnings
pub const SUCCESS_WITH_WARNINGS: u8 = 10;
/// Parameters or inputs failed validation
pub const VALIDATION_ERROR: u8 = 20;
/// The mod failed while running
pub const RUNTIME_ERROR: u8 = 30;
/// Reserved for orchestrators
pub const TIMEOUT: u8 = 40;
/// Reserved for orchestrators
pub const CANCELED: u8 = 50;

/// Final status of a mod execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Completed cleanly
    Success,
    /// Completed with warnings
    Warning,
    /// Failed
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A warning or error recorded during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// What happened
    pub message: String,
    /// Severity code, one of the exit code constants
    #[serde(alias = "warning_code", alias = "error_code")]
    pub code: u8,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Identifies one execution in logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    /// `<mod_type>_<8 hex chars>`
    pub run_id: String,
    /// Mod type
    pub mod_type: String,
    /// Mod instance name
    pub mod_name: String,
}

/// Finalized result of one mod execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Final status
    pub status: Status,
    /// Process exit code
    pub exit_code: u8,
    /// Wall-clock seconds between builder creation and finalization
    #[serde(default)]
    pub execution_time: f64,
    /// Numeric or descriptive measurements
    #[serde(default)]
    pub metrics: Map<String, Value>,
    /// Produced data or references to it
    #[serde(default)]
    pub artifacts: Map<String, Value>,
    /// Values shared with downstream mods
    #[serde(default)]
    pub globals: Map<String, Value>,
    /// Recorded warnings
    #[serde(default)]
    pub warnings: Vec<Issue>,
    /// Recorded errors
    #[serde(default)]
    pub errors: Vec<Issue>,
    /// Run identification
    pub logs: RunLog,
}

impl ExecutionResult {
    /// Whether the status is success or warning
    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Success | Status::Warning)
    }

    /// Check that status and exit code agree and the run is identified.
    pub fn check(&self) -> std::result::Result<(), String> {
        match (self.status, self.exit_code) {
            (Status::Success, SUCCESS) | (Status::Warning, SUCCESS_WITH_WARNINGS) => {}
            (Status::Error, code) if code != SUCCESS && code != SUCCESS_WITH_WARNINGS => {}
            (status, code) => {
                return Err(format!(
                    "status '{status}' is inconsistent with exit code {code}"
                ));
            }
        }
        if self.logs.run_id.trim().is_empty() {
            return Err("result has no run_id".to_string());
        }
        Ok(())
    }
}

/// Incremental builder for an [`ExecutionResult`]
#[derive(Debug)]
pub struct ModResult {
    mod_type: String,
    mod_name: String,
    run_id: String,
    started: Instant,
    metrics: Map<String, Value>,
    artifacts: Map<String, Value>,
    globals: Map<String, Value>,
    warnings: Vec<Issue>,
    errors: Vec<Issue>,
}

impl ModResult {
    /// Start a result for one execution of `mod_type` named `mod_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if either name is empty.
    pub fn new(mod_type: &str, mod_name: &str) -> Result<Self> {
        let mod_type = non_empty(mod_type, "mod_type must be a non-empty string")?;
        let mod_name = non_empty(mod_name, "mod_name must be a non-empty string")?;
        let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

        Ok(Self {
            run_id: format!("{mod_type}_{short_id}"),
            mod_type,
            mod_name,
            started: Instant::now(),
            metrics: Map::new(),
            artifacts: Map::new(),
            globals: Map::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        })
    }

    /// Run id assigned at creation
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record a warning with the default warning code
    pub fn add_warning(&mut self, message: &str) -> Result<()> {
        let message = non_empty(message, "warning message cannot be empty")?;
        self.warnings.push(issue(message, SUCCESS_WITH_WARNINGS));
        Ok(())
    }

    /// Record an error with the given code
    pub fn add_error(&mut self, message: &str, code: u8) -> Result<()> {
        let message = non_empty(message, "error message cannot be empty")?;
        self.errors.push(issue(message, code));
        Ok(())
    }

    /// Record a metric
    pub fn add_metric(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = non_empty(key, "metric key cannot be empty")?;
        self.metrics.insert(key, value.into());
        Ok(())
    }

    /// Record an artifact
    pub fn add_artifact(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = non_empty(key, "artifact key cannot be empty")?;
        self.artifacts.insert(key, value.into());
        Ok(())
    }

    /// Record a global for downstream mods
    pub fn add_global(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let key = non_empty(key, "global key cannot be empty")?;
        self.globals.insert(key, value.into());
        Ok(())
    }

    /// Whether any warning has been recorded
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Finalize as a success
    pub fn success(self) -> ExecutionResult {
        self.build(Status::Success, SUCCESS)
    }

    /// Finalize as a success with warnings
    pub fn warning(self) -> ExecutionResult {
        self.build(Status::Warning, SUCCESS_WITH_WARNINGS)
    }

    /// Finalize as a failure with `exit_code`
    pub fn error(self, exit_code: u8) -> ExecutionResult {
        self.build(Status::Error, exit_code)
    }

    fn build(self, status: Status, exit_code: u8) -> ExecutionResult {
        ExecutionResult {
            status,
            exit_code,
            execution_time: self.started.elapsed().as_secs_f64(),
            metrics: self.metrics,
            artifacts: self.artifacts,
            globals: self.globals,
            warnings: self.warnings,
            errors: self.errors,
            logs: RunLog {
                run_id: self.run_id,
                mod_type: self.mod_type,
                mod_name: self.mod_name,
            },
        }
    }
}

/// Error result for parameter or input validation failures
pub fn validation_error(mod_name: &str, message: &str) -> ExecutionResult {
    failure(mod_name, message, VALIDATION_ERROR)
}

/// Error result for failures while a mod was running
pub fn runtime_error(mod_name: &str, message: &str) -> ExecutionResult {
    failure(mod_name, message, RUNTIME_ERROR)
}

fn failure(mod_name: &str, message: &str, code: u8) -> ExecutionResult {
    let mod_name = fallback(mod_name, "unknown");
    let message = fallback(message, "unknown error");
    let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

    ExecutionResult {
        status: Status::Error,
        exit_code: code,
        execution_time: 0.0,
        metrics: Map::new(),
        artifacts: Map::new(),
        globals: Map::new(),
        warnings: Vec::new(),
        errors: vec![issue(message, code)],
        logs: RunLog {
            run_id: format!("unknown_{short_id}"),
            mod_type: "unknown".to_string(),
            mod_name,
        },
    }
}

fn fallback(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn non_empty(value: &str, message: &str) -> Result<String> {
    match value.trim() {
        "" => Err(Error::invalid_argument(message)),
        trimmed => Ok(trimmed.to_string()),
    }
}

fn issue(message: String, code: u8) -> Issue {
    let now = chrono::Utc::now();
    Issue {
        message,
        code,
        timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
    }
}

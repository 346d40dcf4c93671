//! Mod invocation engine

use std::time::Instant;

use modweave_core::result::validation_error;
use modweave_core::{
    ContextStore, Error as CoreError, ExecutionResult, ModRegistry, ParameterResolver, Params,
    validate_params,
};
use memory_stats::MemoryStats;
use serde_json::{Value, json};

/// Runs registered mods through the resolve, substitute, validate and
/// execute pipeline
#[derive(Debug)]
pub struct Engine {
    registry: ModRegistry,
    resolver: ParameterResolver,
    context: ContextStore,
}

impl Engine {
    /// Create an engine with an unset context store
    pub fn new(registry: ModRegistry, resolver: ParameterResolver) -> Self {
        Self {
            registry,
            resolver,
            context: ContextStore::new(),
        }
    }

    /// Use `context` for variable substitution
    pub fn with_context(mut self, context: ContextStore) -> Self {
        self.context = context;
        self
    }

    /// The registry mods are looked up in
    pub fn registry(&self) -> &ModRegistry {
        &self.registry
    }

    /// The context store used for substitution
    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Run one mod instance.
    ///
    /// Never fails. Problems before execution (bad instance name, unknown
    /// type, resolution, substitution or schema errors) produce a
    /// validation error result. The execution itself is timed, process
    /// memory is sampled around it where the platform allows, and both are
    /// attached as `metrics.execution_monitoring`.
    pub fn run_mod(&self, mod_type: &str, params: &Params, mod_name: &str) -> ExecutionResult {
        let mod_name = mod_name.trim();
        if mod_name.is_empty() {
            return validation_error("unknown", "mod_name must be a non-empty string");
        }
        if !is_identifier(mod_name) {
            return validation_error(
                mod_name,
                &format!("mod_name '{mod_name}' must be a valid identifier"),
            );
        }
        let mod_type = mod_type.trim();
        if mod_type.is_empty() {
            return validation_error(mod_name, "mod_type must be a non-empty string");
        }

        let validated = match self.prepare(mod_type, params) {
            Ok(validated) => validated,
            Err(message) => {
                tracing::warn!(mod_type, mod_name, error = %message, "mod rejected before execution");
                let mut result = validation_error(mod_name, &message);
                result.logs.mod_type = mod_type.to_string();
                return result;
            }
        };

        tracing::info!(mod_type, mod_name, "Starting mod execution");
        let memory_start = memory_stats::memory_stats();
        let started = Instant::now();
        let mut result = self.registry.execute(mod_type, &validated, mod_name);
        let elapsed = started.elapsed().as_secs_f64();
        let memory_end = memory_stats::memory_stats();

        result.metrics.insert(
            "execution_monitoring".into(),
            monitoring(elapsed, memory_start, memory_end),
        );
        tracing::info!(
            mod_type,
            mod_name,
            status = %result.status,
            exit_code = result.exit_code,
            execution_time = elapsed,
            "Mod execution completed"
        );
        result
    }

    fn prepare(&self, mod_type: &str, params: &Params) -> Result<Params, String> {
        let entry = self
            .registry
            .get_mod_info(mod_type)
            .map_err(|e| e.to_string())?;
        let resolved = self
            .resolver
            .resolve(mod_type, params)
            .map_err(|e| e.to_string())?;
        let substituted = self
            .context
            .substitute(&resolved)
            .map_err(|e| stage("Context substitution failed", &e))?;
        validate_params(Some(&entry.config_schema), &substituted)
            .map_err(|e| stage("Parameter validation failed", &e))
    }
}

fn stage(prefix: &str, error: &CoreError) -> String {
    format!("{prefix}: {error}")
}

/// Letters, digits and underscores, not starting with a digit
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Execution metrics; memory fields only when both samples were taken
fn monitoring(elapsed: f64, start: Option<MemoryStats>, end: Option<MemoryStats>) -> Value {
    let mut metrics = json!({ "execution_time": round_millis(elapsed) });
    match (start, end) {
        (Some(start), Some(end)) => {
            let start_mb = megabytes(start.physical_mem);
            let end_mb = megabytes(end.physical_mem);
            metrics["memory_start_mb"] = json!(start_mb);
            metrics["memory_end_mb"] = json!(end_mb);
            metrics["memory_delta_mb"] = json!(round_hundredths(end_mb - start_mb));
            metrics["monitoring_available"] = json!(true);
        }
        _ => {
            tracing::debug!("process memory stats unavailable");
            metrics["monitoring_available"] = json!(false);
        }
    }
    metrics
}

fn megabytes(bytes: usize) -> f64 {
    round_hundredths(bytes as f64 / (1024.0 * 1024.0))
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

//! Run a mod instance from a job file

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use modweave_core::result::VALIDATION_ERROR;
use modweave_core::{ModRegistry, ParameterResolver};
use modweave_mods::builtin_catalog;
use modweave_runtime::{Engine, load_job_config, mod_config};
use serde_json::json;

/// Run the run-mod command.
///
/// Prints the execution result as `{"result": {...}}` and exits with the
/// result's exit code. Problems with the job or context file exit with the
/// validation error code before anything runs.
pub fn run(
    registry_path: &str,
    mod_name: &str,
    params_path: &str,
    context_path: Option<&str>,
) -> Result<ExitCode> {
    let registry = ModRegistry::init(registry_path, builtin_catalog())
        .with_context(|| format!("Failed to open registry {registry_path}"))?;

    let job_path = Path::new(params_path);
    let (mod_type, params) = match load_job_config(job_path)
        .and_then(|config| mod_config(&config, mod_name.trim()))
    {
        Ok(found) => found,
        Err(e) => return Ok(reject(&e)),
    };

    let search_dir = job_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let resolver = match ParameterResolver::discover(search_dir) {
        Ok(resolver) => resolver,
        Err(e) => return Ok(reject(&anyhow::Error::from(e))),
    };

    let engine = Engine::new(registry, resolver);
    if let Some(context_path) = context_path {
        if let Err(e) = engine.context().set_context(context_path) {
            let e = anyhow::Error::from(e)
                .context(format!("Error setting context file {context_path}"));
            return Ok(reject(&e));
        }
        tracing::info!(path = context_path, "Using context file");
    }

    tracing::info!(mod_name, mod_type = %mod_type, params = params_path, "Executing mod");
    let result = engine.run_mod(&mod_type, &params, mod_name);

    let output = serde_json::to_string_pretty(&json!({ "result": &result }))?;
    println!("{output}");

    if !result.is_success() {
        tracing::error!(exit_code = result.exit_code, "Mod failed");
    }
    Ok(ExitCode::from(result.exit_code))
}

fn reject(error: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {error:#}");
    ExitCode::from(VALIDATION_ERROR)
}

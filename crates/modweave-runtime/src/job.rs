//! Job configuration files
//!
//! A job file names mod instances and their parameters:
//!
//! ```yaml
//! mods:
//!   extract_customers:
//!     _type: file_reader
//!     file_path: "${paths.input}/customers.csv"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow, bail, ensure};
use modweave_core::Params;
use serde_json::{Map, Value};

use crate::error::Result;

/// Parsed top level of a job file
pub type JobConfig = Map<String, Value>;

/// Load a job file.
///
/// An empty file yields an empty configuration.
///
/// # Errors
///
/// Fails if the path does not exist, is not a file, cannot be read, is not
/// valid YAML, or does not hold a mapping at the top level.
pub fn load_job_config<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
    let path = path.as_ref();
    ensure!(path.exists(), "Job config file not found: {}", path.display());
    ensure!(path.is_file(), "Path is not a file: {}", path.display());

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Cannot read job config {}", path.display()))?;
    let parsed: Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid YAML in {}", path.display()))?;

    let config = match parsed {
        Value::Null => JobConfig::new(),
        Value::Object(map) => map,
        _ => bail!(
            "Job config {} must contain a YAML dictionary",
            path.display()
        ),
    };
    tracing::info!(path = %path.display(), "Loaded job config");
    Ok(config)
}

/// Pick the entry for `mod_name` out of `config`.
///
/// Returns the mod type and the remaining parameters, with `_type`
/// removed.
///
/// # Errors
///
/// Fails if the `mods` section is missing or not a mapping, if `mod_name`
/// has no entry, or if the entry lacks a non-empty string `_type`.
pub fn mod_config(config: &JobConfig, mod_name: &str) -> Result<(String, Params)> {
    let mods = config
        .get("mods")
        .ok_or_else(|| anyhow!("YAML file missing 'mods' section"))?
        .as_object()
        .ok_or_else(|| anyhow!("YAML file 'mods' section must be a dictionary"))?;

    let entry = mods.get(mod_name).ok_or_else(|| {
        let available: Vec<&str> = mods.keys().map(String::as_str).collect();
        anyhow!(
            "Mod '{mod_name}' not found. Available mods: [{}]",
            available.join(", ")
        )
    })?;
    let Value::Object(entry) = entry else {
        bail!("Mod '{mod_name}' configuration must be a dictionary");
    };

    let mod_type = match entry.get("_type") {
        None => bail!("Mod '{mod_name}' missing required '_type' field"),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => bail!("Mod '{mod_name}' _type must be a non-empty string"),
    };

    let mut params = entry.clone();
    params.remove("_type");
    Ok((mod_type, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_job(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("job.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    fn config(value: Value) -> JobConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_load_job_config() {
        let dir = TempDir::new().unwrap();
        let path = write_job(
            &dir,
            "mods:\n  extract:\n    _type: file_reader\n    file_path: in.csv\n    limit: 5\n",
        );

        let loaded = load_job_config(&path).unwrap();
        assert_eq!(
            loaded["mods"]["extract"],
            json!({"_type": "file_reader", "file_path": "in.csv", "limit": 5})
        );
    }

    #[test]
    fn test_empty_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let path = write_job(&dir, "");
        assert!(load_job_config(&path).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_job_config(dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().starts_with("Job config file not found"));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let err = load_job_config(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("Path is not a file"));
    }

    #[rstest]
    #[case::invalid_yaml("mods: [unclosed", "Invalid YAML in")]
    #[case::list_top_level("- a\n- b\n", "must contain a YAML dictionary")]
    #[case::scalar_top_level("just text", "must contain a YAML dictionary")]
    fn test_bad_contents(#[case] contents: &str, #[case] expected: &str) {
        let dir = TempDir::new().unwrap();
        let path = write_job(&dir, contents);
        let err = load_job_config(&path).unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_mod_config_strips_type() {
        let job = config(json!({
            "mods": {"extract": {"_type": " file_reader ", "file_path": "in.csv"}}
        }));
        let (mod_type, params) = mod_config(&job, "extract").unwrap();
        assert_eq!(mod_type, "file_reader");
        assert_eq!(Value::Object(params), json!({"file_path": "in.csv"}));
    }

    #[test]
    fn test_unknown_mod_lists_available() {
        let job = config(json!({"mods": {"a": {"_type": "x"}, "b": {"_type": "y"}}}));
        let err = mod_config(&job, "c").unwrap_err();
        assert_eq!(err.to_string(), "Mod 'c' not found. Available mods: [a, b]");
    }

    #[rstest]
    #[case::no_mods(json!({}), "missing 'mods' section")]
    #[case::mods_not_map(json!({"mods": ["job"]}), "'mods' section must be a dictionary")]
    #[case::entry_not_map(json!({"mods": {"job": "file_reader"}}), "configuration must be a dictionary")]
    #[case::no_type(json!({"mods": {"job": {"file_path": "x"}}}), "missing required '_type' field")]
    #[case::blank_type(json!({"mods": {"job": {"_type": "  "}}}), "_type must be a non-empty string")]
    #[case::numeric_type(json!({"mods": {"job": {"_type": 3}}}), "_type must be a non-empty string")]
    fn test_mod_config_errors(#[case] job: Value, #[case] expected: &str) {
        let err = mod_config(&config(job), "job").unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "unexpected error: {err}"
        );
    }
}

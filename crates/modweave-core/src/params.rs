//! Parameter sets and the defaults merge

use serde_json::{Map, Value};
use std::path::Path;

use crate::config::ProjectConfig;
use crate::error::{Error, Result};

/// A parameter set: parameter name to JSON value
pub type Params = Map<String, Value>;

/// Merges project defaults with job parameters.
///
/// Precedence is project `mod_defaults[mod_type]` first, then job parameters.
/// Schema defaults are applied later by [`crate::validate_params`], and only
/// for keys still absent.
#[derive(Debug, Clone, Default)]
pub struct ParameterResolver {
    project: ProjectConfig,
}

impl ParameterResolver {
    /// Resolver over an already-loaded project configuration
    pub fn new(project: ProjectConfig) -> Self {
        Self { project }
    }

    /// Discover `project_defaults.yaml` starting from `search_path`
    ///
    /// # Errors
    ///
    /// Discovery failures are wrapped in [`Error::Resolution`].
    pub fn discover<P: AsRef<Path>>(search_path: P) -> Result<Self> {
        let project = ProjectConfig::discover(search_path).map_err(|e| Error::Resolution {
            source: Box::new(e),
        })?;
        Ok(Self::new(project))
    }

    /// The project configuration in use
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// Merge defaults for `mod_type` under `job_params`. Neither input is modified.
    pub fn resolve(&self, mod_type: &str, job_params: &Params) -> Result<Params> {
        let mut resolved = self
            .project
            .mod_defaults(mod_type)
            .map_err(|e| Error::Resolution {
                source: Box::new(e),
            })?;

        for (key, value) in job_params {
            resolved.insert(key.clone(), value.clone());
        }

        tracing::debug!(mod_type, keys = resolved.len(), "parameters resolved");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn resolver_with(body: &str) -> (TempDir, ParameterResolver) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("project_defaults.yaml"), body).unwrap();
        let resolver = ParameterResolver::discover(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_job_params_override_project_defaults() {
        let (_dir, resolver) =
            resolver_with("mod_defaults:\n  reader:\n    k: proj\n    j: proj\n");
        let job = json!({"k": "job"}).as_object().cloned().unwrap();

        let merged = resolver.resolve("reader", &job).unwrap();
        assert_eq!(
            Value::Object(merged),
            json!({"k": "job", "j": "proj"})
        );
        assert_eq!(Value::Object(job), json!({"k": "job"}));
    }

    #[test]
    fn test_unknown_type_passes_job_params_through() {
        let (_dir, resolver) = resolver_with("mod_defaults:\n  reader:\n    k: proj\n");
        let job = json!({"x": 1}).as_object().cloned().unwrap();
        assert_eq!(resolver.resolve("writer", &job).unwrap(), job);
    }

    #[test]
    fn test_empty_mod_type_is_resolution_error() {
        let resolver = ParameterResolver::default();
        let err = resolver.resolve("", &Params::new()).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_discover_failure_is_resolution_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("project_defaults.yaml"), "a: [").unwrap();
        match ParameterResolver::discover(dir.path()) {
            Err(Error::Resolution { source }) => {
                assert!(matches!(*source, Error::ProjectConfig { .. }))
            }
            other => panic!("Expected Resolution error, got {other:?}"),
        }
    }
}

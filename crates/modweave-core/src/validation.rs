//! Parameter validation against a mod's config schema

use serde_json::Value;

use crate::error::{Error, Result};
use crate::params::Params;
use crate::schema::ConfigSchema;

/// Check `params` against `schema` and apply optional defaults.
///
/// - Every missing required parameter is reported in one
///   [`Error::MissingParameters`].
/// - Optional parameters with a declared default are filled in when absent.
/// - Declared parameters must match their type and, if present, their enum.
/// - Undeclared parameters pass through untouched.
///
/// With no schema, or an empty one, `params` is returned unchanged.
pub fn validate_params(schema: Option<&ConfigSchema>, params: &Params) -> Result<Params> {
    let Some(schema) = schema.filter(|s| !s.is_empty()) else {
        tracing::debug!("No config schema found - skipping validation");
        return Ok(params.clone());
    };

    let missing: Vec<String> = schema
        .required
        .keys()
        .filter(|name| !params.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingParameters { names: missing });
    }

    let mut validated = params.clone();
    for (name, spec) in &schema.optional {
        if let Some(default) = &spec.default
            && !validated.contains_key(name)
        {
            tracing::debug!(param = %name, "applied schema default");
            validated.insert(name.clone(), default.clone());
        }
    }

    check_declared(schema, &validated)?;
    Ok(validated)
}

/// Type and enum checks for declared parameters, via JSON Schema
fn check_declared(schema: &ConfigSchema, params: &Params) -> Result<()> {
    let validator = jsonschema::validator_for(&schema.json_schema()).map_err(|e| {
        Error::InvalidSchema {
            message: e.to_string(),
        }
    })?;

    let instance = Value::Object(params.clone());
    let Some(error) = validator.iter_errors(&instance).next() else {
        return Ok(());
    };
    Err(Error::InvalidParameter {
        name: parameter_name(&error.instance_path.to_string()),
        message: error.to_string(),
    })
}

/// First segment of a JSON pointer such as `/mode` or `/columns/0`
fn parameter_name(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
        .replace("~1", "/")
        .replace("~0", "~")
}

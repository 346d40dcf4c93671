//! `${...}` variable substitution
//!
//! Parameters may reference values from a context document with
//! `${path.to.value}`. A string that is exactly one reference takes on the
//! referenced value with its JSON type intact; a reference embedded in other
//! text is rendered as a string.
//!
//! ```text
//! context: {"db": {"host": "pg", "port": 5432}}
//!
//! "${db.port}"              -> 5432              (number)
//! "${db.host}:${db.port}"   -> "pg:5432"         (string)
//! ```
//!
//! Substitution is all-or-nothing: one unresolved reference fails the whole
//! call and no partially substituted parameters are returned.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::params::Params;

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("reference pattern is valid"));

static PURE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{([^}]+)\}$").expect("pure reference pattern is valid"));

/// Whether a value contains any `${...}` reference, at any depth.
///
/// Performs no substitution; used to skip context loading entirely when
/// there is nothing to resolve.
pub fn needs_substitution(value: &Value) -> bool {
    match value {
        Value::String(s) => REFERENCE.is_match(s),
        Value::Array(items) => items.iter().any(needs_substitution),
        Value::Object(map) => map.values().any(needs_substitution),
        _ => false,
    }
}

/// Whether any parameter value contains a `${...}` reference.
pub fn params_need_substitution(params: &Params) -> bool {
    params.values().any(needs_substitution)
}

/// Return a copy of `params` with every `${...}` reference resolved.
///
/// # Errors
///
/// Returns [`Error::VariableNotFound`] naming the first reference that does
/// not resolve. Nothing is substituted in that case.
pub fn substitute(params: &Params, context: &Map<String, Value>) -> Result<Params> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), substitute_value(value, context)?)))
        .collect()
}

/// Resolve references inside a single value, recursing into lists and maps.
pub fn substitute_value(value: &Value, context: &Map<String, Value>) -> Result<Value> {
    match value {
        Value::String(text) => substitute_str(text, context),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_value(item, context))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), substitute_value(v, context)?)))
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn substitute_str(text: &str, context: &Map<String, Value>) -> Result<Value> {
    if let Some(caps) = PURE_REFERENCE.captures(text) {
        return lookup(context, &caps[1]).cloned();
    }

    if !REFERENCE.is_match(text) {
        return Ok(Value::String(text.to_string()));
    }

    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;
    for caps in REFERENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        rendered.push_str(&text[last..whole.start()]);
        rendered.push_str(&render(lookup(context, &caps[1])?));
        last = whole.end();
    }
    rendered.push_str(&text[last..]);
    Ok(Value::String(rendered))
}

/// Walk a dotted path through nested maps.
///
/// # Errors
///
/// Fails with [`Error::VariableNotFound`] when a segment is missing or when
/// the walk reaches a non-map value before the last segment.
pub fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Result<&'a Value> {
    let not_found = |detail: String| Error::VariableNotFound {
        reference: format!("${{{path}}}"),
        detail,
    };

    let mut segments = path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut current = context
        .get(first)
        .ok_or_else(|| not_found(format!("key '{first}' missing")))?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .get(segment)
                .ok_or_else(|| not_found(format!("key '{segment}' missing")))?,
            _ => {
                return Err(not_found(format!(
                    "cannot access key '{segment}' on non-object value"
                )));
            }
        };
    }
    Ok(current)
}

/// String form used when a reference is embedded in surrounding text.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Typed access to validated parameters

use modweave_core::Params;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A row of tabular data
pub type Row = Map<String, Value>;

/// The `_mod_name` marker set by the registry, or `fallback`
pub(crate) fn mod_name<'a>(params: &'a Params, fallback: &'a str) -> &'a str {
    params
        .get("_mod_name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback)
}

pub(crate) fn required_str<'a>(params: &'a Params, name: &str) -> Result<&'a str> {
    optional_str(params, name)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::param(name, "must be a non-empty string"))
}

pub(crate) fn optional_str<'a>(params: &'a Params, name: &str) -> Result<Option<&'a str>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Error::param(name, format!("expected a string, got {other}"))),
    }
}

pub(crate) fn optional_bool(params: &Params, name: &str, default: bool) -> Result<bool> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(Error::param(name, format!("expected a boolean, got {other}"))),
    }
}

pub(crate) fn optional_count(params: &Params, name: &str) -> Result<Option<usize>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| Error::param(name, format!("expected a non-negative integer, got {value}"))),
    }
}

/// A list of JSON objects, e.g. the `data` artifact of an upstream mod
pub(crate) fn rows(params: &Params, name: &str) -> Result<Vec<Row>> {
    let items = match params.get(name) {
        Some(Value::Array(items)) => items,
        Some(other) => return Err(Error::param(name, format!("expected a list of rows, got {other}"))),
        None => return Err(Error::param(name, "is required")),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object()
                .cloned()
                .ok_or_else(|| Error::param(name, format!("row {i} is not an object")))
        })
        .collect()
}

/// Deserialize a structured parameter; absent or null yields `None`
pub(crate) fn structured<T: DeserializeOwned>(params: &Params, name: &str) -> Result<Option<T>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Error::param(name, e.to_string())),
    }
}

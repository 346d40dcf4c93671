//! `data_filter`: keep rows matching a list of conditions
//!
//! ```yaml
//! conditions:
//!   - { field: age, op: gte, value: 18 }
//!   - { field: country, op: in, value: [DE, FR] }
//! mode: all
//! ```

use modweave_core::{
    ConfigSchema, ExecutionResult, Mod, ModMetadata, ModOutcome, ModResult, ParamSpec, ParamType,
    Params,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::params::{self as p, Row};

/// Catalog key for [`DataFilter`]
pub const MODULE_PATH: &str = "modweave_mods::data_filter";

const MOD_TYPE: &str = "data_filter";

/// Comparison applied by a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Field value is one of a list
    In,
    /// Field value is none of a list
    NotIn,
    /// Substring, or list membership for list fields
    Contains,
    /// String prefix
    StartsWith,
    /// String suffix
    EndsWith,
    /// Inclusive range `[low, high]`
    Between,
    /// Field is missing or null
    IsNull,
    /// Field is present and not null
    NotNull,
}

/// One filter condition
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    /// Row field to test
    pub field: String,
    /// Comparison
    pub op: Op,
    /// Operand; unused by `is_null` / `not_null`
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    fn check(&self) -> Result<()> {
        let needs_list = |len: Option<usize>| match (&self.value, len) {
            (Value::Array(items), Some(n)) => items.len() == n,
            (Value::Array(_), None) => true,
            _ => false,
        };
        let ok = match self.op {
            Op::In | Op::NotIn => needs_list(None),
            Op::Between => needs_list(Some(2)),
            Op::StartsWith | Op::EndsWith => self.value.is_string(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::param(
                "conditions",
                format!("invalid operand {} for {:?} on '{}'", self.value, self.op, self.field),
            ))
        }
    }

    /// Whether `row` satisfies the condition
    pub fn matches(&self, row: &Row) -> bool {
        let field = row.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            Op::IsNull => field.is_null(),
            Op::NotNull => !field.is_null(),
            _ if field.is_null() => false,
            Op::Eq => loosely_equal(field, &self.value),
            Op::Ne => !loosely_equal(field, &self.value),
            Op::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            Op::Gte => matches!(compare(field, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            Op::Lt => compare(field, &self.value) == Some(Ordering::Less),
            Op::Lte => matches!(compare(field, &self.value), Some(Ordering::Less | Ordering::Equal)),
            Op::In => list_contains(&self.value, field),
            Op::NotIn => !list_contains(&self.value, field),
            Op::Contains => match (field, &self.value) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| loosely_equal(i, needle)),
                _ => false,
            },
            Op::StartsWith => text_test(field, &self.value, |s, n| s.starts_with(n)),
            Op::EndsWith => text_test(field, &self.value, |s, n| s.ends_with(n)),
            Op::Between => match &self.value {
                Value::Array(bounds) if bounds.len() == 2 => {
                    matches!(compare(field, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(compare(field, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            },
        }
    }
}

// Numbers compare by value regardless of integer/float representation.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn list_contains(list: &Value, needle: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|i| loosely_equal(i, needle)))
}

fn text_test(field: &Value, operand: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (field.as_str(), operand.as_str()) {
        (Some(s), Some(n)) => test(s, n),
        _ => false,
    }
}

/// Transformer mod dropping rows that fail the conditions
#[derive(Debug, Clone, Copy, Default)]
pub struct DataFilter;

impl Mod for DataFilter {
    fn metadata(&self) -> ModMetadata {
        ModMetadata::new(
            MOD_TYPE,
            "1.0.0",
            "Keeps rows that match field conditions",
            "transformer",
        )
        .with_ports(&["data"], &["data"])
        .with_globals(&["filtered_rows"])
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .with_required("data", ParamSpec::new(ParamType::List, "Rows to filter"))
            .with_required(
                "conditions",
                ParamSpec::new(ParamType::List, "Conditions as {field, op, value} objects"),
            )
            .with_optional(
                "mode",
                ParamSpec::new(ParamType::Str, "Whether all or any condition must hold")
                    .with_default(json!("all"))
                    .with_enum(vec![json!("all"), json!("any")]),
            )
    }

    fn run(&self, params: &Params) -> ModOutcome {
        Ok(filter(params)?)
    }
}

fn filter(params: &Params) -> Result<ExecutionResult> {
    let mut result = ModResult::new(MOD_TYPE, p::mod_name(params, MOD_TYPE))?;

    let rows = p::rows(params, "data")?;
    let conditions: Vec<Condition> = p::structured(params, "conditions")?
        .ok_or_else(|| Error::param("conditions", "is required"))?;
    for condition in &conditions {
        condition.check()?;
    }
    let any = match p::optional_str(params, "mode")?.unwrap_or("all") {
        "all" => false,
        "any" => true,
        other => return Err(Error::param("mode", format!("unknown mode '{other}'"))),
    };

    let rows_in = rows.len();
    let kept: Vec<Value> = rows
        .into_iter()
        .filter(|row| {
            if any {
                conditions.iter().any(|c| c.matches(row))
            } else {
                conditions.iter().all(|c| c.matches(row))
            }
        })
        .map(Value::Object)
        .collect();
    let rows_out = kept.len();
    tracing::info!(rows_in, rows_out, conditions = conditions.len(), "rows filtered");

    result.add_metric("rows_in", rows_in)?;
    result.add_metric("rows_out", rows_out)?;
    result.add_metric("rows_filtered", rows_in - rows_out)?;
    result.add_global("filtered_rows", rows_out)?;
    result.add_artifact("data", kept)?;

    if rows_out == 0 && rows_in > 0 {
        result.add_warning("all rows were filtered out")?;
        return Ok(result.warning());
    }
    Ok(result.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_core::Status;
    use rstest::rstest;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn condition(value: Value) -> Condition {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(json!({"field": "age", "op": "eq", "value": 30}), true)]
    #[case(json!({"field": "age", "op": "eq", "value": 30.0}), true)]
    #[case(json!({"field": "age", "op": "ne", "value": 30}), false)]
    #[case(json!({"field": "age", "op": "gt", "value": 18}), true)]
    #[case(json!({"field": "age", "op": "lt", "value": 18}), false)]
    #[case(json!({"field": "age", "op": "gte", "value": 30}), true)]
    #[case(json!({"field": "age", "op": "lte", "value": 29}), false)]
    #[case(json!({"field": "name", "op": "gt", "value": "Aaron"}), true)]
    #[case(json!({"field": "name", "op": "gt", "value": 3}), false)]
    #[case(json!({"field": "country", "op": "in", "value": ["DE", "FR"]}), true)]
    #[case(json!({"field": "country", "op": "not_in", "value": ["DE", "FR"]}), false)]
    #[case(json!({"field": "name", "op": "contains", "value": "lic"}), true)]
    #[case(json!({"field": "tags", "op": "contains", "value": "vip"}), true)]
    #[case(json!({"field": "name", "op": "starts_with", "value": "Al"}), true)]
    #[case(json!({"field": "name", "op": "ends_with", "value": "x"}), false)]
    #[case(json!({"field": "age", "op": "between", "value": [18, 30]}), true)]
    #[case(json!({"field": "email", "op": "is_null"}), true)]
    #[case(json!({"field": "missing", "op": "is_null"}), true)]
    #[case(json!({"field": "name", "op": "not_null"}), true)]
    #[case(json!({"field": "email", "op": "eq", "value": null}), false)]
    fn test_condition_matches(#[case] spec: Value, #[case] expected: bool) {
        let sample = row(json!({
            "name": "Alice", "age": 30, "country": "DE", "tags": ["vip"], "email": null
        }));
        assert_eq!(condition(spec).matches(&sample), expected);
    }

    #[rstest]
    #[case(json!({"field": "a", "op": "in", "value": 1}))]
    #[case(json!({"field": "a", "op": "between", "value": [1]}))]
    #[case(json!({"field": "a", "op": "starts_with", "value": 1}))]
    fn test_bad_operands_rejected(#[case] spec: Value) {
        assert!(condition(spec).check().is_err());
    }

    #[test]
    fn test_unknown_op_fails_to_parse() {
        let parsed: std::result::Result<Condition, _> =
            serde_json::from_value(json!({"field": "a", "op": "like"}));
        assert!(parsed.is_err());
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_all_conditions() {
        let result = filter(&params(json!({
            "data": [{"age": 10, "c": "DE"}, {"age": 20, "c": "DE"}, {"age": 30, "c": "FR"}],
            "conditions": [
                {"field": "age", "op": "gte", "value": 18},
                {"field": "c", "op": "eq", "value": "DE"}
            ]
        })))
        .unwrap();

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.artifacts["data"], json!([{"age": 20, "c": "DE"}]));
        assert_eq!(result.metrics["rows_filtered"], json!(2));
        assert_eq!(result.globals["filtered_rows"], json!(1));
    }

    #[test]
    fn test_filter_any_condition() {
        let result = filter(&params(json!({
            "data": [{"age": 10}, {"age": 20}, {"age": 30}],
            "conditions": [
                {"field": "age", "op": "lt", "value": 15},
                {"field": "age", "op": "gt", "value": 25}
            ],
            "mode": "any"
        })))
        .unwrap();
        assert_eq!(result.artifacts["data"], json!([{"age": 10}, {"age": 30}]));
    }

    #[test]
    fn test_everything_filtered_is_warning() {
        let result = filter(&params(json!({
            "data": [{"age": 10}],
            "conditions": [{"field": "age", "op": "gt", "value": 99}]
        })))
        .unwrap();
        assert_eq!(result.status, Status::Warning);
    }

    #[test]
    fn test_malformed_conditions_rejected() {
        let err = filter(&params(json!({
            "data": [],
            "conditions": [{"field": "age"}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("conditions"));
    }
}

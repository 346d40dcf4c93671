//! `field_mapper`: reshape rows with a sequence of field transforms
//!
//! ```yaml
//! transforms:
//!   - map:
//!       customer_id: cust_id
//!   - coalesce:
//!       email: [work_email, home_email]
//!   - add_fields:
//!       source: crm
//!   - drop: [cust_id, work_email, home_email]
//! ```

use modweave_core::{
    ConfigSchema, ExecutionResult, Mod, ModMetadata, ModOutcome, ModResult, ParamSpec, ParamType,
    Params,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::params::{self as p, Row};

/// Catalog key for [`FieldMapper`]
pub const MODULE_PATH: &str = "modweave_mods::field_mapper";

const MOD_TYPE: &str = "field_mapper";

/// One row transform
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Transform {
    /// Copy fields: target <- source. Missing sources give `null`.
    Map {
        /// Field mappings
        map: BTreeMap<String, String>,
    },

    /// Remove fields
    Drop {
        /// Fields to remove
        drop: Vec<String>,
    },

    /// Set constant fields
    AddFields {
        /// Field values
        add_fields: BTreeMap<String, Value>,
    },

    /// Target takes the first non-null source
    Coalesce {
        /// Target to ordered sources
        coalesce: BTreeMap<String, Vec<String>>,
    },
}

impl Transform {
    fn apply(&self, row: &mut Row) {
        match self {
            Self::Map { map } => {
                let source = row.clone();
                for (target, from) in map {
                    let value = source.get(from).cloned().unwrap_or(Value::Null);
                    row.insert(target.clone(), value);
                }
            }
            Self::Drop { drop } => {
                for field in drop {
                    row.remove(field);
                }
            }
            Self::AddFields { add_fields } => {
                for (key, value) in add_fields {
                    row.insert(key.clone(), value.clone());
                }
            }
            Self::Coalesce { coalesce } => {
                for (target, sources) in coalesce {
                    let value = sources
                        .iter()
                        .find_map(|f| row.get(f).filter(|v| !v.is_null()).cloned())
                        .unwrap_or(Value::Null);
                    row.insert(target.clone(), value);
                }
            }
        }
    }
}

/// Apply `transforms` in order to every row
pub fn apply_transforms(rows: Vec<Row>, transforms: &[Transform]) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            for transform in transforms {
                transform.apply(&mut row);
            }
            row
        })
        .collect()
}

/// Transformer mod renaming, dropping, adding and coalescing fields
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMapper;

impl Mod for FieldMapper {
    fn metadata(&self) -> ModMetadata {
        ModMetadata::new(
            MOD_TYPE,
            "1.0.0",
            "Renames, drops, adds and coalesces row fields",
            "transformer",
        )
        .with_ports(&["data"], &["data"])
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .with_required("data", ParamSpec::new(ParamType::List, "Rows to transform"))
            .with_required(
                "transforms",
                ParamSpec::new(
                    ParamType::List,
                    "Ordered map / drop / add_fields / coalesce steps",
                ),
            )
    }

    fn run(&self, params: &Params) -> ModOutcome {
        Ok(map_fields(params)?)
    }
}

fn map_fields(params: &Params) -> Result<ExecutionResult> {
    let mut result = ModResult::new(MOD_TYPE, p::mod_name(params, MOD_TYPE))?;

    let rows = p::rows(params, "data")?;
    let transforms: Vec<Transform> = p::structured(params, "transforms")?
        .ok_or_else(|| Error::param("transforms", "is required"))?;
    if transforms.is_empty() {
        result.add_warning("no transforms given; rows passed through unchanged")?;
    }

    let row_count = rows.len();
    let mapped = apply_transforms(rows, &transforms);
    tracing::info!(rows = row_count, transforms = transforms.len(), "fields mapped");

    result.add_metric("rows_processed", row_count)?;
    result.add_metric("transforms_applied", transforms.len())?;
    result.add_artifact("data", mapped.into_iter().map(Value::Object).collect::<Vec<_>>())?;

    if result.has_warnings() {
        return Ok(result.warning());
    }
    Ok(result.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_core::Status;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn transforms(value: Value) -> Vec<Transform> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_map_copies_fields() {
        let rows = vec![row(json!({"first_name": "Alice", "age": 30}))];
        let result = apply_transforms(rows, &transforms(json!([{"map": {"name": "first_name"}}])));
        assert_eq!(result[0]["name"], "Alice");
        assert_eq!(result[0]["first_name"], "Alice");
    }

    #[test]
    fn test_map_missing_source_gives_null() {
        let rows = vec![row(json!({"a": 1}))];
        let result = apply_transforms(rows, &transforms(json!([{"map": {"b": "nonexistent"}}])));
        assert_eq!(result[0]["b"], Value::Null);
    }

    #[test]
    fn test_drop_removes_fields() {
        let rows = vec![row(json!({"a": 1, "b": 2, "c": 3}))];
        let result = apply_transforms(rows, &transforms(json!([{"drop": ["b"]}])));
        assert_eq!(result[0]["a"], 1);
        assert!(result[0].get("b").is_none());
    }

    #[test]
    fn test_coalesce_picks_first_non_null() {
        let rows = vec![
            row(json!({"a": null, "b": "val", "c": "other"})),
            row(json!({"a": null, "b": null})),
        ];
        let result =
            apply_transforms(rows, &transforms(json!([{"coalesce": {"out": ["a", "b", "c"]}}])));
        assert_eq!(result[0]["out"], "val");
        assert_eq!(result[1]["out"], Value::Null);
    }

    #[test]
    fn test_combined_transforms_apply_in_order() {
        let rows = vec![row(json!({"name": "Alice", "email": "alice@example.com", "age": 30}))];
        let result = apply_transforms(
            rows,
            &transforms(json!([
                {"map": {"full_name": "name"}},
                {"drop": ["name", "age"]},
                {"add_fields": {"processed": true}}
            ])),
        );
        assert_eq!(
            Value::Object(result[0].clone()),
            json!({"full_name": "Alice", "email": "alice@example.com", "processed": true})
        );
    }

    #[test]
    fn test_mod_run_publishes_rows() {
        let params = json!({
            "data": [{"a": 1}, {"a": 2}],
            "transforms": [{"add_fields": {"b": "x"}}]
        })
        .as_object()
        .cloned()
        .unwrap();

        let result = map_fields(&params).unwrap();
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.artifacts["data"], json!([{"a": 1, "b": "x"}, {"a": 2, "b": "x"}]));
        assert_eq!(result.metrics["rows_processed"], json!(2));
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let params = json!({"data": [], "transforms": [{"regex": {}}]})
            .as_object()
            .cloned()
            .unwrap();
        assert!(map_fields(&params).is_err());
    }

    #[test]
    fn test_declarations_are_valid() {
        assert!(FieldMapper.metadata().validated().is_ok());
        assert!(FieldMapper.config_schema().validate().is_ok());
    }
}

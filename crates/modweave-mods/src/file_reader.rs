//! `file_reader`: load a CSV, JSON or JSON-lines file into rows
//!
//! The rows are published as the `data` artifact so a downstream mod can
//! take them as its `data` parameter.

use modweave_core::{
    ConfigSchema, ExecutionResult, Mod, ModMetadata, ModOutcome, ModResult, ParamSpec, ParamType,
    Params,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::{self, FileFormat};
use crate::params::{self as p, Row};

/// Catalog key for [`FileReader`]
pub const MODULE_PATH: &str = "modweave_mods::file_reader";

const MOD_TYPE: &str = "file_reader";

/// Source mod reading tabular files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

impl Mod for FileReader {
    fn metadata(&self) -> ModMetadata {
        ModMetadata::new(
            MOD_TYPE,
            "1.0.0",
            "Reads CSV, JSON or JSON-lines files into rows",
            "source",
        )
        .with_ports(&[], &["data"])
        .with_globals(&["row_count", "column_count"])
        .with_packages(&["csv>=1.3"])
    }

    fn config_schema(&self) -> ConfigSchema {
        let formats = FileFormat::NAMES.iter().map(|f| json!(f)).collect();
        ConfigSchema::new()
            .with_required("file_path", ParamSpec::new(ParamType::Str, "Path to the input file"))
            .with_optional(
                "format",
                ParamSpec::new(ParamType::Str, "File format; inferred from the extension if unset")
                    .with_default(Value::Null)
                    .with_enum(formats),
            )
            .with_optional(
                "delimiter",
                ParamSpec::new(ParamType::Str, "CSV field delimiter").with_default(json!(",")),
            )
            .with_optional(
                "has_header",
                ParamSpec::new(ParamType::Bool, "Whether the first CSV row holds column names")
                    .with_default(json!(true)),
            )
            .with_optional(
                "infer_types",
                ParamSpec::new(ParamType::Bool, "Convert numeric and boolean CSV cells")
                    .with_default(json!(true)),
            )
            .with_optional(
                "limit",
                ParamSpec::new(ParamType::Int, "Maximum number of rows to read")
                    .with_default(Value::Null),
            )
    }

    fn run(&self, params: &Params) -> ModOutcome {
        Ok(read(params)?)
    }
}

fn read(params: &Params) -> Result<ExecutionResult> {
    let mut result = ModResult::new(MOD_TYPE, p::mod_name(params, MOD_TYPE))?;

    let file_path = p::required_str(params, "file_path")?;
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(Error::param("file_path", format!("file not found: {file_path}")));
    }
    let file_format = FileFormat::resolve(p::optional_str(params, "format")?, path)?;

    let mut rows = match file_format {
        FileFormat::Csv => read_csv(
            path,
            format::delimiter(p::optional_str(params, "delimiter")?)?,
            p::optional_bool(params, "has_header", true)?,
            p::optional_bool(params, "infer_types", true)?,
        )?,
        FileFormat::Json => read_json(path)?,
        FileFormat::Jsonl => read_jsonl(path)?,
    };
    if let Some(limit) = p::optional_count(params, "limit")? {
        rows.truncate(limit);
    }

    let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    let column_count = columns.len();
    let row_count = rows.len();
    tracing::info!(path = %path.display(), format = %file_format, rows = row_count, "file read");

    result.add_metric("rows_read", row_count)?;
    result.add_metric("file_size_bytes", std::fs::metadata(path)?.len())?;
    result.add_global("row_count", row_count)?;
    result.add_global("column_count", column_count)?;
    result.add_artifact("file_path", file_path)?;
    result.add_artifact("data", rows.into_iter().map(Value::Object).collect::<Vec<_>>())?;

    if row_count == 0 {
        result.add_warning(&format!("no rows read from {file_path}"))?;
        return Ok(result.warning());
    }
    Ok(result.success())
}

fn read_csv(path: &Path, delimiter: u8, has_header: bool, infer_types: bool) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_header)
        .flexible(false)
        .from_path(path)?;

    let headers: Option<Vec<String>> = if has_header {
        Some(reader.headers()?.iter().map(|h| h.trim().to_string()).collect())
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = record
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let name = headers
                    .as_ref()
                    .and_then(|h| h.get(i).cloned())
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                let value = if infer_types {
                    infer(cell)
                } else {
                    Value::String(cell.to_string())
                };
                (name, value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn infer(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return json!(n);
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
    {
        return json!(f);
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

fn read_json(path: &Path) -> Result<Vec<Row>> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&contents)?;
    let Value::Array(items) = parsed else {
        return Err(format_error(path, FileFormat::Json, "expected a top-level array"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(row) => Ok(row),
            _ => Err(format_error(path, FileFormat::Json, &format!("item {i} is not an object"))),
        })
        .collect()
}

fn read_jsonl(path: &Path) -> Result<Vec<Row>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed)? {
            Value::Object(row) => rows.push(row),
            _ => {
                return Err(format_error(
                    path,
                    FileFormat::Jsonl,
                    &format!("line {} is not an object", index + 1),
                ));
            }
        }
    }
    Ok(rows)
}

fn format_error(path: &Path, format: FileFormat, message: &str) -> Error {
    Error::Format {
        path: path.display().to_string(),
        format: format.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_core::Status;
    use tempfile::TempDir;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn write(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_declarations_are_valid() {
        assert!(FileReader.metadata().validated().is_ok());
        assert!(FileReader.config_schema().validate().is_ok());
    }

    #[test]
    fn test_reads_csv_with_inferred_types() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "people.csv", "name,age,active,score\nAlice,30,true,1.5\nBob,,false,2\n");

        let result = read(&params(json!({"file_path": path, "_mod_name": "people"}))).unwrap();
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.logs.mod_name, "people");
        assert_eq!(result.globals["row_count"], json!(2));
        assert_eq!(result.globals["column_count"], json!(4));

        let data = &result.artifacts["data"];
        assert_eq!(data[0]["name"], json!("Alice"));
        assert_eq!(data[0]["age"], json!(30));
        assert_eq!(data[0]["active"], json!(true));
        assert_eq!(data[0]["score"], json!(1.5));
        assert_eq!(data[1]["age"], Value::Null);
    }

    #[test]
    fn test_reads_csv_as_strings() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "codes.csv", "code;zip\n007;01234\n");
        let result = read(&params(json!({
            "file_path": path,
            "delimiter": ";",
            "infer_types": false
        })))
        .unwrap();
        assert_eq!(result.artifacts["data"][0]["zip"], json!("01234"));
    }

    #[test]
    fn test_headerless_csv_gets_generated_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "raw.csv", "a,1\nb,2\n");
        let result = read(&params(json!({"file_path": path, "has_header": false}))).unwrap();
        assert_eq!(result.artifacts["data"][1]["column_1"], json!("b"));
        assert_eq!(result.artifacts["data"][1]["column_2"], json!(2));
    }

    #[test]
    fn test_reads_json_and_jsonl() {
        let dir = TempDir::new().unwrap();
        let json_path = write(&dir, "a.json", r#"[{"id": 1}, {"id": 2}]"#);
        let jsonl_path = write(&dir, "b.jsonl", "{\"id\": 1}\n\n{\"id\": 2}\n{\"id\": 3}\n");

        let result = read(&params(json!({"file_path": json_path}))).unwrap();
        assert_eq!(result.globals["row_count"], json!(2));

        let result = read(&params(json!({"file_path": jsonl_path, "limit": 2}))).unwrap();
        assert_eq!(result.globals["row_count"], json!(2));
        assert_eq!(result.metrics["rows_read"], json!(2));
    }

    #[test]
    fn test_empty_file_is_warning() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.csv", "id,name\n");
        let result = read(&params(json!({"file_path": path}))).unwrap();
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = read(&params(json!({"file_path": "/nonexistent/file.csv"}))).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_must_be_array_of_objects() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "obj.json", r#"{"id": 1}"#);
        assert!(matches!(
            read(&params(json!({"file_path": path}))),
            Err(Error::Format { .. })
        ));

        let path = write(&dir, "mixed.jsonl", "{\"id\": 1}\n[1]\n");
        let err = read(&params(json!({"file_path": path}))).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}

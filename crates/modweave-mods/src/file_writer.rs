//! `file_writer`: persist rows as CSV, JSON or JSON lines

use modweave_core::{
    ConfigSchema, ExecutionResult, Mod, ModMetadata, ModOutcome, ModResult, ParamSpec, ParamType,
    Params,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::{self, FileFormat};
use crate::params::{self as p, Row};

/// Catalog key for [`FileWriter`]
pub const MODULE_PATH: &str = "modweave_mods::file_writer";

const MOD_TYPE: &str = "file_writer";

/// Sink mod writing rows to a file
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriter;

impl Mod for FileWriter {
    fn metadata(&self) -> ModMetadata {
        ModMetadata::new(
            MOD_TYPE,
            "1.0.0",
            "Writes rows to CSV, JSON or JSON-lines files",
            "sink",
        )
        .with_ports(&["data"], &[])
        .with_globals(&["rows_written"])
        .with_packages(&["csv>=1.3"])
    }

    fn config_schema(&self) -> ConfigSchema {
        let formats = FileFormat::NAMES.iter().map(|f| json!(f)).collect();
        ConfigSchema::new()
            .with_required("data", ParamSpec::new(ParamType::List, "Rows to write"))
            .with_required("output_path", ParamSpec::new(ParamType::Str, "Destination file"))
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
                "create_dirs",
                ParamSpec::new(ParamType::Bool, "Create missing parent directories")
                    .with_default(json!(true)),
            )
            .with_optional(
                "overwrite",
                ParamSpec::new(ParamType::Bool, "Replace an existing file")
                    .with_default(json!(true)),
            )
    }

    fn run(&self, params: &Params) -> ModOutcome {
        Ok(write(params)?)
    }
}

fn write(params: &Params) -> Result<ExecutionResult> {
    let mut result = ModResult::new(MOD_TYPE, p::mod_name(params, MOD_TYPE))?;

    let rows = p::rows(params, "data")?;
    let output_path = p::required_str(params, "output_path")?;
    let path = Path::new(output_path);
    let file_format = FileFormat::resolve(p::optional_str(params, "format")?, path)?;

    if path.exists() && !p::optional_bool(params, "overwrite", true)? {
        return Err(Error::param(
            "output_path",
            format!("{output_path} exists and overwrite is false"),
        ));
    }
    if p::optional_bool(params, "create_dirs", true)?
        && let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match file_format {
        FileFormat::Csv => write_csv(
            &mut writer,
            &rows,
            format::delimiter(p::optional_str(params, "delimiter")?)?,
        )?,
        FileFormat::Json => {
            let items: Vec<Value> = rows.iter().cloned().map(Value::Object).collect();
            serde_json::to_writer_pretty(&mut writer, &items)?;
            writeln!(writer)?;
        }
        FileFormat::Jsonl => {
            for row in &rows {
                writeln!(writer, "{}", serde_json::to_string(row)?)?;
            }
        }
    }
    writer.flush()?;

    let row_count = rows.len();
    tracing::info!(path = %path.display(), format = %file_format, rows = row_count, "file written");

    result.add_metric("rows_written", row_count)?;
    result.add_metric("file_size_bytes", std::fs::metadata(path)?.len())?;
    result.add_global("rows_written", row_count)?;
    result.add_artifact("output_path", output_path)?;

    if row_count == 0 {
        result.add_warning("no rows to write; created an empty file")?;
        return Ok(result.warning());
    }
    Ok(result.success())
}

fn write_csv<W: Write>(writer: W, rows: &[Row], delimiter: u8) -> Result<()> {
    // Column order follows first appearance across rows.
    let mut seen = BTreeSet::new();
    let columns: Vec<&String> = rows
        .iter()
        .flat_map(|row| row.keys())
        .filter(|key| seen.insert(key.as_str()))
        .collect();

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    if columns.is_empty() {
        return Ok(());
    }
    csv_writer.write_record(columns.iter().map(|c| c.as_str()))?;
    for row in rows {
        csv_writer.write_record(columns.iter().map(|c| cell(row.get(c.as_str()))))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

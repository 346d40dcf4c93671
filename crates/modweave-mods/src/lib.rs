//! modweave Built-in Mods
//!
//! Ready-made mods covering the usual ETL steps:
//!
//! | mod type       | category    | does                                      |
//! |----------------|-------------|-------------------------------------------|
//! | `file_reader`  | source      | CSV / JSON / JSON-lines file → `data`     |
//! | `data_filter`  | transformer | keep rows matching conditions             |
//! | `field_mapper` | transformer | map / drop / add_fields / coalesce fields |
//! | `file_writer`  | sink        | `data` → CSV / JSON / JSON-lines file     |
//!
//! # Example
//!
//! ```rust,ignore
//! use modweave_core::ModRegistry;
//!
//! let registry = ModRegistry::init("mod_registry.json", modweave_mods::builtin_catalog())?;
//! registry.register(modweave_mods::file_reader::MODULE_PATH)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data_filter;
pub mod error;
pub mod field_mapper;
pub mod file_reader;
pub mod file_writer;
pub mod format;
pub mod params;

pub use data_filter::DataFilter;
pub use error::{Error, Result};
pub use field_mapper::FieldMapper;
pub use file_reader::FileReader;
pub use file_writer::FileWriter;

use modweave_core::ModCatalog;

/// Catalog containing every built-in mod under its module path
pub fn builtin_catalog() -> ModCatalog {
    ModCatalog::new()
        .with(file_reader::MODULE_PATH, FileReader)
        .with(file_writer::MODULE_PATH, FileWriter)
        .with(data_filter::MODULE_PATH, DataFilter)
        .with(field_mapper::MODULE_PATH, FieldMapper)
}

//! The mod registry
//!
//! A JSON file maps each mod type to its implementation's module path,
//! metadata and config schema. It is loaded once, mutated in memory, and
//! written back atomically after every change:
//!
//! ```text
//! write  mod_registry.json.tmp
//! rename mod_registry.json      -> mod_registry.json.backup
//! rename mod_registry.json.tmp  -> mod_registry.json
//! remove mod_registry.json.backup
//! ```
//!
//! Implementations are looked up in a [`ModCatalog`] by module path; the
//! registry never runs anything that is not linked into the binary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::{Mod, ModCatalog};
use crate::error::{Error, Result};
use crate::params::Params;
use crate::result::{ExecutionResult, runtime_error};
use crate::schema::{ConfigSchema, ModMetadata};

/// Default registry file name
pub const REGISTRY_FILE: &str = "mod_registry.json";

/// One registered mod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEntry {
    /// Catalog key of the implementation
    pub module_path: String,

    /// Mod type; equal to the registry key
    #[serde(rename = "type")]
    pub mod_type: String,

    /// Semantic version
    pub version: String,

    /// Human description
    pub description: String,

    /// Category tag
    pub category: String,

    /// Named input ports
    pub input_ports: Vec<String>,

    /// Named output ports
    pub output_ports: Vec<String>,

    /// Exported global variable names
    pub globals: Vec<String>,

    /// Package requirements
    pub packages: Vec<String>,

    /// Minimum runtime version
    #[serde(rename = "python_version", skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    /// Declared parameters
    pub config_schema: ConfigSchema,

    /// RFC 3339 registration time
    pub registered_at: String,
}

impl RegistryEntry {
    fn from_mod(module_path: &str, metadata: ModMetadata, config_schema: ConfigSchema) -> Self {
        Self {
            module_path: module_path.to_string(),
            mod_type: metadata.mod_type,
            version: metadata.version,
            description: metadata.description,
            category: metadata.category,
            input_ports: metadata.input_ports,
            output_ports: metadata.output_ports,
            globals: metadata.globals,
            packages: metadata.packages,
            runtime_version: metadata.runtime_version,
            config_schema,
            registered_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A `mods` slot as loaded from disk.
///
/// Entries that do not parse are kept verbatim so one bad entry neither
/// blocks the rest of the registry nor gets lost on the next save.
#[derive(Debug, Clone, PartialEq)]
enum StoredEntry {
    Valid(RegistryEntry),
    Malformed { raw: Value, reason: String },
}

impl StoredEntry {
    fn category(&self) -> Option<&str> {
        match self {
            Self::Valid(entry) => Some(&entry.category),
            Self::Malformed { raw, .. } => raw.get("category").and_then(Value::as_str),
        }
    }
}

impl Serialize for StoredEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Valid(entry) => entry.serialize(serializer),
            Self::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StoredEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match RegistryEntry::deserialize(&raw) {
            Ok(entry) => Self::Valid(entry),
            Err(e) => Self::Malformed {
                raw,
                reason: e.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(rename = "_metadata", default)]
    metadata: Map<String, Value>,
    mods: BTreeMap<String, StoredEntry>,
}

/// Why a mod execution was turned into an error result
#[derive(thiserror::Error, Debug)]
pub enum ExecutionFailure {
    /// The mod returned an error
    #[error("Mod execution failed: {0}")]
    Raised(String),

    /// The mod panicked
    #[error("Mod panicked: {0}")]
    Panicked(String),

    /// The mod returned a result that is internally inconsistent
    #[error("Mod returned a malformed result: {0}")]
    MalformedResult(String),

    /// The mod could not be looked up or resolved
    #[error("{0}")]
    Unavailable(String),
}

/// Registry of mod types, backed by a JSON file
#[derive(Debug)]
pub struct ModRegistry {
    path: PathBuf,
    catalog: ModCatalog,
    document: Mutex<RegistryDocument>,
}

impl ModRegistry {
    /// Load an existing registry file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFormat`] if the file is missing, is not
    /// JSON, or lacks a `mods` object. Individual entries that fail to parse
    /// are kept and reported by [`ModRegistry::validate_all`].
    pub fn open<P: AsRef<Path>>(path: P, catalog: ModCatalog) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format_error = |message: String| Error::RegistryFormat {
            path: path.clone(),
            message,
        };

        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => format_error("registry file not found".to_string()),
            _ => Error::Io(e),
        })?;
        let raw: Value = serde_json::from_str(&contents)
            .map_err(|e| format_error(format!("invalid JSON: {e}")))?;

        let Value::Object(root) = &raw else {
            return Err(format_error("registry file must contain a JSON object".to_string()));
        };
        match root.get("mods") {
            Some(Value::Object(_)) => {}
            Some(_) => return Err(format_error("'mods' section must be an object".to_string())),
            None => return Err(format_error("registry file missing 'mods' section".to_string())),
        }

        let document: RegistryDocument = serde_json::from_value(raw)
            .map_err(|e| format_error(format!("malformed entry: {e}")))?;
        for (mod_type, entry) in &document.mods {
            if let StoredEntry::Malformed { reason, .. } = entry {
                tracing::warn!(mod_type = %mod_type, reason = %reason, "malformed registry entry");
            }
        }
        tracing::debug!(path = %path.display(), mods = document.mods.len(), "registry loaded");

        Ok(Self {
            path,
            catalog,
            document: Mutex::new(document),
        })
    }

    /// Open the registry at `path`, creating an empty one if none exists
    pub fn init<P: AsRef<Path>>(path: P, catalog: ModCatalog) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::open(path, catalog);
        }

        let mut metadata = Map::new();
        metadata.insert("version".into(), Value::from("1.0.0"));
        metadata.insert("created".into(), Value::from(chrono::Utc::now().to_rfc3339()));
        metadata.insert(
            "description".into(),
            Value::from("Mod registry - single source of truth for available mods"),
        );

        let registry = Self {
            path: path.to_path_buf(),
            catalog,
            document: Mutex::new(RegistryDocument {
                metadata,
                mods: BTreeMap::new(),
            }),
        };
        registry.save(&mut registry.lock())?;
        tracing::info!(path = %path.display(), "registry created");
        Ok(registry)
    }

    /// Registry file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Catalog of linked-in implementations
    pub fn catalog(&self) -> &ModCatalog {
        &self.catalog
    }

    fn lock(&self) -> MutexGuard<'_, RegistryDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the entry for `mod_type`
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] lists every registered type;
    /// [`Error::MalformedEntry`] if the stored entry did not parse.
    pub fn get_mod_info(&self, mod_type: &str) -> Result<RegistryEntry> {
        let mod_type = trimmed(mod_type, "mod_type must be a non-empty string")?;
        let document = self.lock();
        match document.mods.get(mod_type) {
            Some(StoredEntry::Valid(entry)) => Ok(entry.clone()),
            Some(StoredEntry::Malformed { reason, .. }) => Err(Error::MalformedEntry {
                mod_type: mod_type.to_string(),
                reason: reason.clone(),
            }),
            None => Err(Error::NotFound {
                mod_type: mod_type.to_string(),
                available: document.mods.keys().cloned().collect(),
            }),
        }
    }

    /// Register the implementation at `module_path` under its metadata type.
    ///
    /// Returns the registered mod type.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMod`] if the path is not in the catalog or the mod
    ///   declares invalid metadata or schema
    /// - [`Error::AlreadyRegistered`] on a duplicate type
    /// - [`Error::Persistence`] if the file could not be written; the
    ///   in-memory registry keeps the new entry
    pub fn register(&self, module_path: &str) -> Result<String> {
        let module_path = trimmed(module_path, "module_path must be a non-empty string")?;
        let invalid = |message: String| Error::InvalidMod {
            module_path: module_path.to_string(),
            message,
        };

        let implementation = self
            .catalog
            .resolve(module_path)
            .ok_or_else(|| invalid("no such implementation in the mod catalog".to_string()))?;
        let metadata = implementation
            .metadata()
            .validated()
            .map_err(|e| invalid(e.to_string()))?;
        let config_schema = implementation.config_schema();
        config_schema
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        let mod_type = metadata.mod_type.clone();
        let mut document = self.lock();
        if document.mods.contains_key(&mod_type) {
            return Err(Error::AlreadyRegistered { mod_type });
        }
        document.mods.insert(
            mod_type.clone(),
            StoredEntry::Valid(RegistryEntry::from_mod(module_path, metadata, config_schema)),
        );
        self.save(&mut document)?;

        tracing::info!(mod_type = %mod_type, module_path, "registered mod");
        Ok(mod_type)
    }

    /// Remove `mod_type` from the registry.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if absent; [`Error::Persistence`] if the file could
    /// not be written, in which case the entry is already gone from memory.
    pub fn delete(&self, mod_type: &str) -> Result<()> {
        let mod_type = trimmed(mod_type, "mod_type must be a non-empty string")?;
        let mut document = self.lock();
        if document.mods.remove(mod_type).is_none() {
            return Err(Error::NotFound {
                mod_type: mod_type.to_string(),
                available: document.mods.keys().cloned().collect(),
            });
        }
        self.save(&mut document)?;
        tracing::info!(mod_type, "deleted mod");
        Ok(())
    }

    /// Registered types, optionally restricted to one category
    pub fn list_available(&self, category: Option<&str>) -> Vec<String> {
        self.lock()
            .mods
            .iter()
            .filter(|(_, entry)| category.is_none_or(|c| entry.category() == Some(c)))
            .map(|(mod_type, _)| mod_type.clone())
            .collect()
    }

    /// Check every entry against the catalog; returns all problems found
    pub fn validate_all(&self) -> Vec<String> {
        let entries: Vec<(String, StoredEntry)> = self
            .lock()
            .mods
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut problems = Vec::new();
        for (mod_type, stored) in entries {
            let entry = match stored {
                StoredEntry::Valid(entry) => entry,
                StoredEntry::Malformed { reason, .. } => {
                    problems.push(format!("Mod '{mod_type}' entry malformed: {reason}"));
                    continue;
                }
            };
            if entry.module_path.trim().is_empty() {
                problems.push(format!("Mod '{mod_type}' missing module_path"));
                continue;
            }
            if entry.mod_type != mod_type {
                problems.push(format!(
                    "Mod '{mod_type}' entry declares mismatched type '{}'",
                    entry.mod_type
                ));
            }
            if let Err(e) = entry.config_schema.validate() {
                problems.push(format!("Mod '{mod_type}' stored schema invalid: {e}"));
            }

            let Some(implementation) = self.catalog.resolve(&entry.module_path) else {
                problems.push(format!(
                    "Mod '{mod_type}' import failed: '{}' is not in the mod catalog",
                    entry.module_path
                ));
                continue;
            };
            match implementation.metadata().validated() {
                Ok(metadata) if metadata.mod_type != mod_type => problems.push(format!(
                    "Mod '{mod_type}' implementation declares type '{}'",
                    metadata.mod_type
                )),
                Ok(_) => {}
                Err(e) => problems.push(format!("Mod '{mod_type}' metadata validation failed: {e}")),
            }
            if let Err(e) = implementation.config_schema().validate() {
                problems.push(format!("Mod '{mod_type}' config schema validation failed: {e}"));
            }
        }
        problems
    }

    fn implementation(&self, mod_type: &str) -> Result<Arc<dyn Mod>> {
        let entry = self.get_mod_info(mod_type)?;
        self.catalog
            .resolve(&entry.module_path)
            .ok_or_else(|| Error::InvalidMod {
                module_path: entry.module_path,
                message: "no such implementation in the mod catalog".to_string(),
            })
    }

    /// Run `mod_type` with already-validated `params`.
    ///
    /// Never fails: lookup errors, mod errors, panics and inconsistent
    /// results all come back as a `runtime_error` result. The registry lock
    /// is not held while the mod runs.
    pub fn execute(&self, mod_type: &str, params: &Params, mod_name: &str) -> ExecutionResult {
        let mod_type = mod_type.trim();
        let mod_name = mod_name.trim();

        let outcome = match self.implementation(mod_type) {
            Ok(implementation) => {
                let mut run_params = params.clone();
                run_params.insert("_mod_name".into(), Value::from(mod_name));
                run_params.insert("_mod_type".into(), Value::from(mod_type));

                tracing::debug!(mod_type, mod_name, "executing mod");
                match panic::catch_unwind(AssertUnwindSafe(|| implementation.run(&run_params))) {
                    Ok(Ok(result)) => match result.check() {
                        Ok(()) => Ok(result),
                        Err(reason) => Err(ExecutionFailure::MalformedResult(reason)),
                    },
                    Ok(Err(e)) => Err(ExecutionFailure::Raised(e.to_string())),
                    Err(payload) => Err(ExecutionFailure::Panicked(panic_message(payload))),
                }
            }
            Err(e) => Err(ExecutionFailure::Unavailable(e.to_string())),
        };

        let mut result = outcome.unwrap_or_else(|failure| {
            tracing::error!(mod_type, mod_name, error = %failure, "mod execution failed");
            runtime_error(mod_name, &failure.to_string())
        });
        result.logs.mod_type = mod_type.to_string();
        result.logs.mod_name = mod_name.to_string();
        result
    }

    fn save(&self, document: &mut RegistryDocument) -> Result<()> {
        document.metadata.insert(
            "last_updated".into(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
        let contents = serde_json::to_string_pretty(document)?;

        let temp = with_suffix(&self.path, ".tmp");
        let backup = with_suffix(&self.path, ".backup");
        replace_file(&self.path, &temp, &backup, &contents).map_err(|source| {
            if temp.exists() && fs::remove_file(&temp).is_err() {
                tracing::warn!(path = %temp.display(), "failed to clean up temp file");
            }
            Error::Persistence {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::debug!(path = %self.path.display(), "registry saved");
        Ok(())
    }
}

fn replace_file(path: &Path, temp: &Path, backup: &Path, contents: &str) -> io::Result<()> {
    fs::write(temp, contents)?;
    if !path.exists() {
        return fs::rename(temp, path);
    }

    if backup.exists() {
        fs::remove_file(backup)?;
    }
    fs::rename(path, backup)?;
    if let Err(e) = fs::rename(temp, path) {
        // Put the previous file back before reporting.
        let _ = fs::rename(backup, path);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(backup) {
        tracing::warn!(path = %backup.display(), error = %e, "failed to remove registry backup");
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn trimmed<'a>(value: &'a str, message: &str) -> Result<&'a str> {
    match value.trim() {
        "" => Err(Error::invalid_argument(message)),
        trimmed => Ok(trimmed),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! The mod trait and the table of compiled-in implementations
//!
//! The registry file refers to implementations by module path (for example
//! `modweave_mods::file_reader`). A [`ModCatalog`] maps those paths to
//! [`Mod`] values linked into the binary, and is built once at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::params::Params;
use crate::result::ExecutionResult;
use crate::schema::{ConfigSchema, ModMetadata};

/// Error type mods report failures with
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a mod's `run` returns
pub type ModOutcome = std::result::Result<ExecutionResult, BoxError>;

/// A unit of ETL work
pub trait Mod: Send + Sync {
    /// Descriptive metadata; `metadata().mod_type` is the registry key
    fn metadata(&self) -> ModMetadata;

    /// Declared parameters
    fn config_schema(&self) -> ConfigSchema;

    /// Execute with validated parameters.
    ///
    /// `params` carries `_mod_name` and `_mod_type` in addition to the
    /// declared parameters.
    fn run(&self, params: &Params) -> ModOutcome;
}

/// Module path to implementation table
#[derive(Clone, Default)]
pub struct ModCatalog {
    mods: BTreeMap<String, Arc<dyn Mod>>,
}

impl ModCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an implementation under `module_path`, builder style
    pub fn with(mut self, module_path: impl Into<String>, implementation: impl Mod + 'static) -> Self {
        self.insert(module_path, implementation);
        self
    }

    /// Add an implementation under `module_path`
    pub fn insert(&mut self, module_path: impl Into<String>, implementation: impl Mod + 'static) {
        self.mods.insert(module_path.into(), Arc::new(implementation));
    }

    /// Implementation for `module_path`, if linked in
    pub fn resolve(&self, module_path: &str) -> Option<Arc<dyn Mod>> {
        self.mods.get(module_path.trim()).cloned()
    }

    /// All known module paths, sorted
    pub fn module_paths(&self) -> Vec<String> {
        self.mods.keys().cloned().collect()
    }

    /// Number of implementations
    pub fn len(&self) -> usize {
        self.mods.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
}

impl fmt::Debug for ModCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModCatalog")
            .field("module_paths", &self.module_paths())
            .finish()
    }
}

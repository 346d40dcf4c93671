//! modweave Core Library
//!
//! This crate provides the core functionality for modweave:
//! - Context documents and `${...}` variable substitution
//! - Project defaults discovery and parameter resolution
//! - Mod metadata, config schemas, and parameter validation
//! - The mod registry and the standard execution result envelope
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Resolver   │────▶│ Substitution │────▶│  Validator  │────▶│  Registry   │
//! │ (defaults)  │     │  (context)   │     │  (schema)   │     │  (execute)  │
//! └─────────────┘     └──────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use modweave_core::{ContextStore, ParameterResolver, validate_params};
//!
//! let resolver = ParameterResolver::discover(".")?;
//! let merged = resolver.resolve("file_reader", &job_params)?;
//! let substituted = context.substitute(&merged)?;
//! let entry = registry.get_mod_info("file_reader")?;
//! let params = validate_params(Some(&entry.config_schema), &substituted)?;
//! let result = registry.execute("file_reader", &params, "customers");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod registry;
pub mod result;
pub mod schema;
pub mod substitution;
pub mod validation;

pub use catalog::{BoxError, Mod, ModCatalog, ModOutcome};
pub use config::ProjectConfig;
pub use context::{ContextDocument, ContextInfo, ContextStore};
pub use error::{ContextFailure, Error, Result};
pub use params::{ParameterResolver, Params};
pub use registry::{ExecutionFailure, ModRegistry, RegistryEntry};
pub use result::{ExecutionResult, ModResult, Status};
pub use schema::{ConfigSchema, ModMetadata, ParamSpec, ParamType};
pub use validation::validate_params;

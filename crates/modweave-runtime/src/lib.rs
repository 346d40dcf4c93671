//! Modweave Runtime
//!
//! This crate turns a job configuration entry into a mod execution.
//! It wires the core pieces together in a fixed order:
//!
//! ```text
//! job.yaml ──► mod_config ──► resolve ──► substitute ──► validate ──► execute
//!              (type, params)  (defaults)  (context)      (schema)     (registry)
//! ```
//!
//! Everything up to and including validation fails with a validation error
//! result (exit code 20). Failures while the mod runs become runtime error
//! results (exit code 30).
//!
//! # Usage
//!
//! ```rust,ignore
//! use modweave_runtime::{Engine, load_job_config, mod_config};
//!
//! let config = load_job_config("jobs/daily.yaml")?;
//! let (mod_type, params) = mod_config(&config, "extract_customers")?;
//! let result = engine.run_mod(&mod_type, &params, "extract_customers");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod job;

pub use engine::Engine;
pub use error::{Error, Result};
pub use job::{JobConfig, load_job_config, mod_config};

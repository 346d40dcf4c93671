//! CLI command implementations

pub mod registry;
pub mod run;

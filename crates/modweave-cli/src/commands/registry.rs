//! Registry management commands

use std::process::ExitCode;

use anyhow::{Context, Result};
use modweave_core::ModRegistry;
use modweave_mods::builtin_catalog;

fn open(registry_path: &str) -> Result<ModRegistry> {
    ModRegistry::open(registry_path, builtin_catalog())
        .with_context(|| format!("Failed to open registry {registry_path}"))
}

/// Create the registry file if it does not exist
pub fn init(registry_path: &str) -> Result<()> {
    let registry = ModRegistry::init(registry_path, builtin_catalog())
        .with_context(|| format!("Failed to initialize registry {registry_path}"))?;
    println!("Registry ready: {}", registry.path().display());
    Ok(())
}

/// List registered mods
pub fn list(registry_path: &str, category: Option<&str>) -> Result<()> {
    let registry = open(registry_path)?;
    let mod_types = registry.list_available(category);
    let filter = category
        .map(|c| format!(" in category '{c}'"))
        .unwrap_or_default();

    if mod_types.is_empty() {
        println!("No mods found{filter}");
        return Ok(());
    }

    let title = format!("Registered mods{filter} ({})", mod_types.len());
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    for mod_type in mod_types {
        match registry.get_mod_info(&mod_type) {
            Ok(entry) => println!("  {mod_type} (v{}) - {}", entry.version, entry.description),
            Err(e) => println!("  {mod_type} - Error loading info: {e}"),
        }
    }
    Ok(())
}

/// Show one registry entry
pub fn info(registry_path: &str, mod_type: &str) -> Result<()> {
    let registry = open(registry_path)?;
    let entry = registry.get_mod_info(mod_type)?;

    let title = format!("Mod Information: {}", entry.mod_type);
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    println!("Module Path: {}", entry.module_path);
    println!("Version: {}", entry.version);
    println!("Category: {}", entry.category);
    println!("Description: {}", entry.description);
    println!("Input Ports: {}", list_or_none(&entry.input_ports));
    println!("Output Ports: {}", list_or_none(&entry.output_ports));
    println!("Globals: {}", list_or_none(&entry.globals));
    println!("Packages: {}", list_or_none(&entry.packages));
    if let Some(version) = &entry.runtime_version {
        println!("Runtime Version: {version}");
    }
    println!("Registered: {}", entry.registered_at);

    println!("Parameters:");
    for (name, spec) in &entry.config_schema.required {
        println!("  {name} ({}, required) - {}", spec.param_type, spec.description);
    }
    for (name, spec) in &entry.config_schema.optional {
        match &spec.default {
            Some(default) => println!(
                "  {name} ({}, default {default}) - {}",
                spec.param_type, spec.description
            ),
            None => println!("  {name} ({}) - {}", spec.param_type, spec.description),
        }
    }
    Ok(())
}

/// Register a built-in mod, creating the registry file if needed
pub fn register(registry_path: &str, module_path: &str) -> Result<()> {
    let registry = ModRegistry::init(registry_path, builtin_catalog())
        .with_context(|| format!("Failed to open registry {registry_path}"))?;
    println!("Registering mod: {module_path}");
    let mod_type = registry
        .register(module_path)
        .context("Registration failed")?;
    println!("Successfully registered mod: {mod_type}");
    Ok(())
}

/// Remove a mod from the registry
pub fn delete(registry_path: &str, mod_type: &str) -> Result<()> {
    let registry = open(registry_path)?;
    registry.delete(mod_type)?;
    println!("Successfully deleted mod '{mod_type}' from registry");
    Ok(())
}

/// Validate every entry; exits non-zero if any problem is found
pub fn validate(registry_path: &str) -> Result<ExitCode> {
    let registry = open(registry_path)?;
    println!("Validating registry...");

    let problems = registry.validate_all();
    if problems.is_empty() {
        let total = registry.list_available(None).len();
        println!("Registry validation successful! All {total} mods are valid.");
        return Ok(ExitCode::SUCCESS);
    }

    tracing::warn!(problems = problems.len(), "registry validation failed");
    println!("Registry validation failed:");
    for problem in &problems {
        println!("  - {problem}");
    }
    Ok(ExitCode::FAILURE)
}

/// List module paths compiled into this binary
pub fn catalog() {
    let catalog = builtin_catalog();
    println!("Available module paths ({})", catalog.len());
    for module_path in catalog.module_paths() {
        if let Some(implementation) = catalog.resolve(&module_path) {
            let metadata = implementation.metadata();
            println!(
                "  {module_path} -> {} ({})",
                metadata.mod_type, metadata.category
            );
        }
    }
}

fn list_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "None".to_string()
    } else {
        values.join(", ")
    }
}

//! Integration tests for the resolve → substitute → validate → execute pipeline
//!
//! Tests use temporary project directories with real files to verify:
//! - Project defaults discovery from a jobs directory
//! - Context substitution over merged parameters
//! - Schema defaults and required-parameter aggregation
//! - Registry persistence and execution through the catalog

use modweave_core::{
    ConfigSchema, ContextStore, Error, Mod, ModCatalog, ModMetadata, ModOutcome, ModRegistry,
    ModResult, ParamSpec, ParamType, ParameterResolver, Params, Status, validate_params,
};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

struct Connect;

impl Mod for Connect {
    fn metadata(&self) -> ModMetadata {
        ModMetadata::new("db_connect", "0.3.1", "Opens a database connection", "source")
            .with_ports(&[], &["connection"])
            .with_globals(&["dsn"])
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .with_required("host", ParamSpec::new(ParamType::Str, "Database host"))
            .with_required("port", ParamSpec::new(ParamType::Int, "Database port"))
            .with_optional(
                "sslmode",
                ParamSpec::new(ParamType::Str, "TLS mode")
                    .with_default(json!("prefer"))
                    .with_enum(vec![json!("disable"), json!("prefer"), json!("require")]),
            )
    }

    fn run(&self, params: &Params) -> ModOutcome {
        let mod_name = params["_mod_name"].as_str().unwrap_or("db_connect");
        let mut result = ModResult::new("db_connect", mod_name)?;
        let dsn = format!(
            "{}:{}?sslmode={}",
            params["host"].as_str().unwrap_or_default(),
            params["port"],
            params["sslmode"].as_str().unwrap_or_default()
        );
        result.add_global("dsn", dsn)?;
        Ok(result.success())
    }
}

/// Helper to create a project with a `jobs/` directory and a registry.
fn setup_project(defaults: &str, context: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("jobs")).unwrap();
    std::fs::write(dir.path().join("project_defaults.yaml"), defaults).unwrap();
    std::fs::write(dir.path().join("context.json"), context).unwrap();
    dir
}

fn open_registry(root: &Path) -> ModRegistry {
    let catalog = ModCatalog::new().with("tests::connect", Connect);
    let registry = ModRegistry::init(root.join("mod_registry.json"), catalog).unwrap();
    if registry.get_mod_info("db_connect").is_err() {
        registry.register("tests::connect").unwrap();
    }
    registry
}

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

// =============================================================================
// Complete Pipeline Tests
// =============================================================================

#[test]
fn test_complete_pipeline() {
    let dir = setup_project(
        "mod_defaults:\n  db_connect:\n    host: \"${db.host}\"\n    port: 1\n",
        r#"{"db": {"host": "pg.internal", "port": 5432}}"#,
    );
    let registry = open_registry(dir.path());
    let resolver = ParameterResolver::discover(dir.path().join("jobs")).unwrap();
    let context = ContextStore::new();
    context.set_context(dir.path().join("context.json")).unwrap();

    let job = params(json!({"port": "${db.port}"}));
    let merged = resolver.resolve("db_connect", &job).unwrap();
    let substituted = context.substitute(&merged).unwrap();
    assert_eq!(substituted["host"], json!("pg.internal"));
    assert_eq!(substituted["port"], json!(5432));

    let entry = registry.get_mod_info("db_connect").unwrap();
    let validated = validate_params(Some(&entry.config_schema), &substituted).unwrap();
    assert_eq!(validated["sslmode"], json!("prefer"));

    let result = registry.execute("db_connect", &validated, "warehouse");
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.globals["dsn"], json!("pg.internal:5432?sslmode=prefer"));
    assert_eq!(result.logs.mod_name, "warehouse");
}

#[test]
fn test_missing_required_after_merge_reports_all() {
    let dir = setup_project("project_name: empty\n", "{}");
    let registry = open_registry(dir.path());
    let resolver = ParameterResolver::discover(dir.path().join("jobs")).unwrap();

    let merged = resolver.resolve("db_connect", &Params::new()).unwrap();
    let entry = registry.get_mod_info("db_connect").unwrap();
    match validate_params(Some(&entry.config_schema), &merged) {
        Err(Error::MissingParameters { names }) => assert_eq!(names, vec!["host", "port"]),
        other => panic!("Expected MissingParameters, got {other:?}"),
    }
}

#[test]
fn test_registry_survives_restart() {
    let dir = setup_project("", "{}");
    let first = open_registry(dir.path());
    let registered_at = first.get_mod_info("db_connect").unwrap().registered_at;
    drop(first);

    let second = open_registry(dir.path());
    let entry = second.get_mod_info("db_connect").unwrap();
    assert_eq!(entry.registered_at, registered_at);
    assert_eq!(entry.output_ports, vec!["connection"]);
    assert_eq!(entry.globals, vec!["dsn"]);
    assert!(second.validate_all().is_empty());
}

#[test]
fn test_substitution_failure_names_reference() {
    let dir = setup_project("", r#"{"db": {"host": "pg"}}"#);
    let context = ContextStore::new();
    context.set_context(dir.path().join("context.json")).unwrap();

    let err = context
        .substitute(&params(json!({"port": "${db.port}"})))
        .unwrap_err();
    assert!(err.to_string().contains("${db.port}"));
}

#[test]
fn test_enum_violation_after_substitution() {
    let dir = setup_project("", r#"{"tls": "sometimes"}"#);
    let registry = open_registry(dir.path());
    let context = ContextStore::new();
    context.set_context(dir.path().join("context.json")).unwrap();

    let substituted = context
        .substitute(&params(json!({"host": "h", "port": 1, "sslmode": "${tls}"})))
        .unwrap();
    let entry = registry.get_mod_info("db_connect").unwrap();
    match validate_params(Some(&entry.config_schema), &substituted) {
        Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "sslmode"),
        other => panic!("Expected InvalidParameter, got {other:?}"),
    }
}

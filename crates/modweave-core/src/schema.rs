//! Mod metadata and parameter schemas
//!
//! Every mod declares a [`ModMetadata`] block describing what it is and a
//! [`ConfigSchema`] describing the parameters it takes. Both are checked when
//! the mod is registered and stored verbatim in the registry file.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

static SEMVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("semver pattern is valid"));

static PACKAGE_REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9._-]*(\s*(==|>=|<=|!=|~=|>|<)\s*[A-Za-z0-9.*+!-]+(\s*,\s*(==|>=|<=|!=|~=|>|<)\s*[A-Za-z0-9.*+!-]+)*)?$",
    )
    .expect("package pattern is valid")
});

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string
    Str,
    /// Integral JSON number
    Int,
    /// Any JSON number
    Float,
    /// JSON boolean
    Bool,
    /// JSON array
    List,
    /// JSON object
    Dict,
    /// Anything
    Object,
}

impl ParamType {
    /// JSON Schema type name; `None` for [`ParamType::Object`], which accepts anything
    pub fn json_type(self) -> Option<&'static str> {
        match self {
            Self::Str => Some("string"),
            Self::Int => Some("integer"),
            Self::Float => Some("number"),
            Self::Bool => Some("boolean"),
            Self::List => Some("array"),
            Self::Dict => Some("object"),
            Self::Object => None,
        }
    }

    /// JSON Schema for a value of this type; `null` is always allowed
    pub fn json_schema(self) -> Value {
        match self.json_type() {
            Some(name) => json!({ "type": [name, "null"] }),
            None => json!({}),
        }
    }

    /// Whether `value` is acceptable for this type. `null` is accepted for every type.
    pub fn accepts(self, value: &Value) -> bool {
        jsonschema::validator_for(&self.json_schema())
            .map(|validator| validator.is_valid(value))
            .unwrap_or(false)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Declaration of a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Expected value type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Default value; `Some(Value::Null)` is an explicit `default: null`
    #[serde(
        default,
        deserialize_with = "explicit_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    /// Allowed values, if restricted
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

// A present key always yields `Some`, even when its value is `null`.
fn explicit_default<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ParamSpec {
    /// Create a parameter declaration
    pub fn new(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            default: None,
            allowed: None,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict the parameter to a fixed set of values
    pub fn with_enum(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    /// JSON Schema property for this parameter.
    ///
    /// `null` passes both the type and the enum check.
    pub fn json_schema(&self) -> Value {
        let mut property = match self.param_type.json_schema() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if !self.description.is_empty() {
            property.insert("description".into(), Value::from(self.description.as_str()));
        }
        if let Some(allowed) = &self.allowed {
            let mut options = allowed.clone();
            if !options.contains(&Value::Null) {
                options.push(Value::Null);
            }
            property.insert("enum".into(), Value::Array(options));
        }
        Value::Object(property)
    }
}

/// Required and optional parameter declarations for a mod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Parameters that must be supplied
    #[serde(default)]
    pub required: BTreeMap<String, ParamSpec>,

    /// Parameters that may be omitted
    #[serde(default)]
    pub optional: BTreeMap<String, ParamSpec>,
}

impl ConfigSchema {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter
    pub fn with_required(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.required.insert(name.into(), spec);
        self
    }

    /// Add an optional parameter
    pub fn with_optional(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.optional.insert(name.into(), spec);
        self
    }

    /// Whether no parameters are declared
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }

    /// Declaration for `name`, required or optional
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.required.get(name).or_else(|| self.optional.get(name))
    }

    /// JSON Schema describing the declared parameters.
    ///
    /// Presence of required parameters is not part of it; undeclared keys
    /// are allowed.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .required
            .iter()
            .chain(&self.optional)
            .map(|(name, spec)| (name.clone(), spec.json_schema()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": true,
        })
    }

    /// Check the schema declarations themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] when a description is empty, a
    /// required parameter declares a default, or a default or enum value
    /// does not match the declared type.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidSchema { message };

        for (name, spec) in &self.required {
            check_spec(name, spec).map_err(invalid)?;
            if spec.default.is_some() {
                return Err(invalid(format!(
                    "required parameter '{name}' cannot have a default value"
                )));
            }
        }

        for (name, spec) in &self.optional {
            check_spec(name, spec).map_err(invalid)?;
            if let Some(default) = &spec.default
                && !spec.param_type.accepts(default)
            {
                return Err(invalid(format!(
                    "default for '{name}' does not match type {}",
                    spec.param_type
                )));
            }
        }

        Ok(())
    }
}

fn check_spec(name: &str, spec: &ParamSpec) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("parameter names cannot be empty".to_string());
    }
    if spec.description.trim().is_empty() {
        return Err(format!("parameter '{name}' must have a description"));
    }
    if let Some(allowed) = &spec.allowed {
        if allowed.is_empty() {
            return Err(format!("enum for '{name}' cannot be empty"));
        }
        if let Some(bad) = allowed.iter().find(|v| !spec.param_type.accepts(v)) {
            return Err(format!(
                "enum value {bad} for '{name}' does not match type {}",
                spec.param_type
            ));
        }
    }
    Ok(())
}

/// Descriptive metadata declared by a mod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModMetadata {
    /// Mod type name; the registry key
    #[serde(rename = "type")]
    pub mod_type: String,

    /// Semantic version (`X.Y.Z`)
    pub version: String,

    /// What the mod does
    pub description: String,

    /// Category tag, e.g. `source`, `transformer`, `sink`
    pub category: String,

    /// Named input ports
    #[serde(default)]
    pub input_ports: Vec<String>,

    /// Named output ports
    #[serde(default)]
    pub output_ports: Vec<String>,

    /// Global variable names the mod exports
    #[serde(default)]
    pub globals: Vec<String>,

    /// Package requirements, e.g. `csv>=1.3`
    #[serde(default)]
    pub packages: Vec<String>,

    /// Minimum runtime version, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
}

impl ModMetadata {
    /// Create metadata with no ports, globals or packages
    pub fn new(
        mod_type: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            mod_type: mod_type.into(),
            version: version.into(),
            description: description.into(),
            category: category.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            globals: Vec::new(),
            packages: Vec::new(),
            runtime_version: None,
        }
    }

    /// Set input and output ports
    pub fn with_ports(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.input_ports = inputs.iter().map(|s| s.to_string()).collect();
        self.output_ports = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set exported global names
    pub fn with_globals(mut self, globals: &[&str]) -> Self {
        self.globals = globals.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set package requirements
    pub fn with_packages(mut self, packages: &[&str]) -> Self {
        self.packages = packages.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Return a trimmed copy, or the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] describing the offending field.
    pub fn validated(&self) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidMetadata {
            message: message.to_string(),
        };

        let mod_type = self.mod_type.trim();
        if mod_type.is_empty() {
            return Err(invalid("type cannot be empty"));
        }
        if mod_type.chars().count() < 2 {
            return Err(invalid("type should be at least 2 characters"));
        }

        let version = self.version.trim();
        if !SEMVER.is_match(version) {
            return Err(Error::InvalidMetadata {
                message: format!("version '{version}' must follow semantic versioning (X.Y.Z)"),
            });
        }

        let description = self.description.trim();
        if description.is_empty() {
            return Err(invalid("description cannot be empty"));
        }
        if description.chars().count() < 10 {
            return Err(invalid("description should be at least 10 characters"));
        }

        let category = self.category.trim();
        if category.is_empty() {
            return Err(invalid("category cannot be empty"));
        }

        let packages = self
            .packages
            .iter()
            .map(|p| {
                let p = p.trim();
                if PACKAGE_REQUIREMENT.is_match(p) {
                    Ok(p.to_string())
                } else {
                    Err(Error::InvalidMetadata {
                        message: format!("invalid package requirement '{p}'"),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let names = |items: &[String], field: &str| {
            items
                .iter()
                .map(|s| {
                    let s = s.trim();
                    if s.is_empty() {
                        Err(Error::InvalidMetadata {
                            message: format!("{field} entries cannot be empty"),
                        })
                    } else {
                        Ok(s.to_string())
                    }
                })
                .collect::<Result<Vec<_>>>()
        };

        Ok(Self {
            mod_type: mod_type.to_string(),
            version: version.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            input_ports: names(&self.input_ports, "input_ports")?,
            output_ports: names(&self.output_ports, "output_ports")?,
            globals: names(&self.globals, "globals")?,
            packages,
            runtime_version: self
                .runtime_version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }
}

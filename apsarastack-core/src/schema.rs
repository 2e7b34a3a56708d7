//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling validation of
//! the manifest before any API call and schema-aware diffing afterwards.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Decides whether a difference between state (`old`) and desired (`new`)
/// should be ignored. The full desired attribute map is passed so the
/// decision can depend on sibling attributes.
pub type DiffSuppressFn =
    fn(old: Option<&Value>, new: Option<&Value>, desired: &HashMap<String, Value>) -> bool;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection without duplicates
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested block with its own attribute schemas
    Object(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::MapValueError {
                                key: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.required => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Object".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ReadOnlyAttribute { name: String },

    #[error("Attribute '{name}': {message}")]
    ConstraintViolated { name: String, message: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Value constraint checked after the type check succeeds
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Integer must be one of the listed values
    IntIn(Vec<i64>),
    /// Integer within an inclusive range
    IntBetween(i64, i64),
    /// String length (in characters) within an inclusive range
    LenBetween(usize, usize),
    /// Number of list/set items within an inclusive range
    ItemsBetween(usize, usize),
}

impl Constraint {
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Constraint::IntIn(allowed), Value::Int(n)) => {
                if allowed.contains(n) {
                    Ok(())
                } else {
                    let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
                    Err(format!("expected one of [{}], got {}", allowed.join(", "), n))
                }
            }
            (Constraint::IntBetween(min, max), Value::Int(n)) => {
                if n >= min && n <= max {
                    Ok(())
                } else {
                    Err(format!("expected to be in the range ({} - {}), got {}", min, max, n))
                }
            }
            (Constraint::LenBetween(min, max), Value::String(s)) => {
                let len = s.chars().count();
                if len >= *min && len <= *max {
                    Ok(())
                } else {
                    Err(format!(
                        "expected length to be in the range ({} - {}), got {}",
                        min, max, s
                    ))
                }
            }
            (Constraint::ItemsBetween(min, max), Value::List(items)) => {
                if items.len() >= *min && items.len() <= *max {
                    Ok(())
                } else {
                    Err(format!(
                        "expected between {} and {} items, got {}",
                        min,
                        max,
                        items.len()
                    ))
                }
            }
            // Type mismatches are reported by the type check
            _ => Ok(()),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Filled in by the provider when not configured
    pub computed: bool,
    /// Computed and never settable from the manifest
    pub read_only: bool,
    /// A change forces the resource to be replaced
    pub force_new: bool,
    /// Masked in plan output
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub constraints: Vec<Constraint>,
    pub diff_suppress: Option<DiffSuppressFn>,
    /// Provider-side field name (e.g., "DBInstanceDescription")
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            read_only: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            constraints: Vec::new(),
            diff_suppress: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Computed attribute that cannot be set in the manifest
    pub fn read_only(mut self) -> Self {
        self.computed = true;
        self.read_only = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_diff_suppress(mut self, suppress: DiffSuppressFn) -> Self {
        self.diff_suppress = Some(suppress);
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    fn check(&self, value: &Value) -> Result<(), TypeError> {
        self.attr_type.validate(value)?;
        for constraint in &self.constraints {
            constraint
                .check(value)
                .map_err(|message| TypeError::ConstraintViolated {
                    name: self.name.clone(),
                    message,
                })?;
        }
        Ok(())
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    /// Data sources are read-only lookups
    pub data_source: bool,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            data_source: false,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn as_data_source(mut self) -> Self {
        self.data_source = true;
        self
    }

    /// Fill in schema defaults for attributes the manifest leaves out
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !attributes.contains_key(name)
            {
                attributes.insert(name.clone(), default.clone());
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            match self.attributes.get(name) {
                Some(schema) if schema.read_only => {
                    errors.push(TypeError::ReadOnlyAttribute { name: name.clone() });
                }
                Some(schema) => {
                    if let Err(e) = schema.check(value) {
                        errors.push(e);
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_type() -> AttributeType {
        AttributeType::Object(vec![
            AttributeSchema::new("node_class", AttributeType::String).required(),
            AttributeSchema::new("node_storage", AttributeType::Int).required(),
            AttributeSchema::new("node_id", AttributeType::String).read_only(),
        ])
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["WiredTiger".to_string(), "RocksDB".to_string()]);
        assert!(t.validate(&Value::String("RocksDB".to_string())).is_ok());
        assert!(t.validate(&Value::String("InnoDB".to_string())).is_err());
    }

    #[test]
    fn validate_object_requires_nested_fields() {
        let t = node_type();
        let mut node = HashMap::new();
        node.insert("node_class".to_string(), Value::from("dds.shard.mid"));
        assert!(matches!(
            t.validate(&Value::Map(node.clone())),
            Err(TypeError::MissingRequired { name }) if name == "node_storage"
        ));

        node.insert("node_storage".to_string(), Value::Int(10));
        assert!(t.validate(&Value::Map(node)).is_ok());
    }

    #[test]
    fn constraints_are_checked_after_type() {
        let schema = ResourceSchema::new("resource")
            .attribute(
                AttributeSchema::new("period", AttributeType::Int)
                    .with_constraint(Constraint::IntIn(vec![1, 2, 3, 12])),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .with_constraint(Constraint::LenBetween(2, 256)),
            );

        let mut attrs = HashMap::new();
        attrs.insert("period".to_string(), Value::Int(12));
        attrs.insert("name".to_string(), Value::from("ok"));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("period".to_string(), Value::Int(10));
        attrs.insert("name".to_string(), Value::from("x"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn items_between_bounds_lists() {
        let schema = ResourceSchema::new("resource").attribute(
            AttributeSchema::new("shard_list", AttributeType::List(Box::new(node_type())))
                .required()
                .with_constraint(Constraint::ItemsBetween(2, 32)),
        );

        let mut node = HashMap::new();
        node.insert("node_class".to_string(), Value::from("dds.shard.mid"));
        node.insert("node_storage".to_string(), Value::Int(10));

        let mut attrs = HashMap::new();
        attrs.insert(
            "shard_list".to_string(),
            Value::List(vec![Value::Map(node.clone())]),
        );
        assert!(schema.validate(&attrs).is_err());

        attrs.insert(
            "shard_list".to_string(),
            Value::List(vec![Value::Map(node.clone()), Value::Map(node)]),
        );
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_and_read_only_attributes_are_rejected() {
        let schema = ResourceSchema::new("resource").attribute(
            AttributeSchema::new("retention_period", AttributeType::Int).read_only(),
        );

        let mut attrs = HashMap::new();
        attrs.insert("retention_period".to_string(), Value::Int(7));
        attrs.insert("colour".to_string(), Value::from("blue"));

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::ReadOnlyAttribute { .. }))
        );
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::UnknownAttribute { .. }))
        );
    }

    #[test]
    fn defaults_fill_missing_attributes_only() {
        let schema = ResourceSchema::new("resource").attribute(
            AttributeSchema::new("default_cooldown", AttributeType::Int)
                .with_default(Value::Int(300)),
        );

        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("default_cooldown"), Some(&Value::Int(300)));

        attrs.insert("default_cooldown".to_string(), Value::Int(20));
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("default_cooldown"), Some(&Value::Int(20)));
    }
}

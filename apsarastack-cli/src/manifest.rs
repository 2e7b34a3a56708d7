//! JSON manifest: provider settings, resources and data sources

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use apsarastack_core::resource::{Resource, Value};
use apsarastack_core::schema::ResourceSchema;
use apsarastack_provider::ProviderSettings;
use apsarastack_provider::resources::resource_types;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub resources: Vec<Block>,
    #[serde(default)]
    pub data: Vec<Block>,
}

/// One `resources` or `data` entry
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Block {
    fn to_resource(&self, read_only: bool) -> Resource {
        let mut resource =
            Resource::new(&self.resource_type, &self.name).with_read_only(read_only);
        for (key, value) in &self.attributes {
            if let Some(value) = Value::from_json(value) {
                resource.attributes.insert(key.clone(), value);
            }
        }
        resource
    }
}

pub fn schemas() -> HashMap<String, ResourceSchema> {
    resource_types()
        .into_iter()
        .map(|rt| (rt.name().to_string(), rt.schema()))
        .collect()
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    /// Data sources followed by resources, with schema defaults applied.
    /// Fails with every validation error found.
    pub fn desired(&self) -> Result<Vec<Resource>, String> {
        let schemas = schemas();
        let mut seen = HashSet::new();
        let mut all_errors = Vec::new();
        let mut desired = Vec::new();

        let blocks = self
            .data
            .iter()
            .map(|b| (b, true))
            .chain(self.resources.iter().map(|b| (b, false)));
        for (block, read_only) in blocks {
            let mut resource = block.to_resource(read_only);
            let label = resource.id.to_string();

            if !seen.insert(resource.id.clone()) {
                all_errors.push(format!("{}: declared more than once", label));
                continue;
            }
            let Some(schema) = schemas.get(&resource.id.resource_type) else {
                all_errors.push(format!("{}: unknown type {}", label, resource.id.resource_type));
                continue;
            };
            if schema.data_source != read_only {
                let expected = if schema.data_source { "data" } else { "resources" };
                all_errors.push(format!("{}: belongs under \"{}\"", label, expected));
                continue;
            }

            schema.apply_defaults(&mut resource.attributes);
            if let Err(errors) = schema.validate(&resource.attributes) {
                for error in errors {
                    all_errors.push(format!("{}: {}", label, error));
                }
            }
            desired.push(resource);
        }

        if all_errors.is_empty() {
            Ok(desired)
        } else {
            Err(format!("Validation failed:\n  {}", all_errors.join("\n  ")))
        }
    }
}

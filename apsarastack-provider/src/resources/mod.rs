//! Resource and data source types
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Helpers shared by the resource handlers

pub mod ess_scaling_group;
pub mod mongodb_sharding_instance;

use std::collections::HashMap;

use apsarastack_core::differ;
use apsarastack_core::provider::{ProviderError, ResourceType};
use apsarastack_core::resource::{Resource, ResourceId, State, Value};
use apsarastack_core::schema::ResourceSchema;

use crate::connectivity::SdkError;
use crate::data_sources;

pub const MONGODB_SHARDING_INSTANCE: &str = "apsarastack_mongodb_sharding_instance";
pub const ESS_SCALING_GROUP: &str = "apsarastack_ess_scaling_group";
pub const HBASE_MULTIMODE_CMS_URL: &str = "apsarastack_hbase_multimode_cms_url";
pub const ADB_ELASTIC_DAILY_PLANS: &str = "apsarastack_adb_elastic_daily_plans";

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:path) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

define_resource_type!(
    MongoDbShardingInstanceType,
    MONGODB_SHARDING_INSTANCE,
    mongodb_sharding_instance::schema
);
define_resource_type!(EssScalingGroupType, ESS_SCALING_GROUP, ess_scaling_group::schema);
define_resource_type!(
    HbaseMultimodeCmsUrlType,
    HBASE_MULTIMODE_CMS_URL,
    data_sources::hbase_multimode_cms_url::schema
);
define_resource_type!(
    AdbElasticDailyPlansType,
    ADB_ELASTIC_DAILY_PLANS,
    data_sources::adb_elastic_daily_plans::schema
);

/// Returns all resource types and data sources supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(MongoDbShardingInstanceType),
        Box::new(EssScalingGroupType),
        Box::new(HbaseMultimodeCmsUrlType),
        Box::new(AdbElasticDailyPlansType),
    ]
}

// =============================================================================
// Handler Helpers
// =============================================================================

/// Convert an API error into a provider error for one resource
pub(crate) fn sdk_error(id: &ResourceId, err: SdkError) -> ProviderError {
    ProviderError::new("ApsaraStack API call failed")
        .for_resource(id.clone())
        .with_cause(err)
}

/// Whether the manifest changes `key` relative to the recorded state
pub(crate) fn has_change(schema: &ResourceSchema, from: &State, to: &Resource, key: &str) -> bool {
    differ::attribute_changed(key, &to.attributes, &from.attributes, Some(schema))
}

/// String-valued map attribute
pub(crate) fn string_map(value: Option<&Value>) -> HashMap<String, String> {
    value
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Attributes the API never returns are kept from the manifest
pub(crate) fn carry_over(state: &mut State, desired: &Resource, keys: &[&str]) {
    for key in keys {
        if let Some(value) = desired.attributes.get(*key) {
            state
                .attributes
                .entry(key.to_string())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_schema() {
        let types = resource_types();
        assert_eq!(types.len(), 4);
        for rt in types {
            let schema = rt.schema();
            assert_eq!(schema.resource_type, rt.name());
            assert!(!schema.attributes.is_empty());
        }
    }

    #[test]
    fn data_sources_are_flagged() {
        assert!(HbaseMultimodeCmsUrlType.schema().data_source);
        assert!(AdbElasticDailyPlansType.schema().data_source);
        assert!(!EssScalingGroupType.schema().data_source);
    }

    #[test]
    fn sdk_errors_keep_their_context() {
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");
        let err = sdk_error(
            &id,
            SdkError::not_found("MongoDB Instance", "dds-1").context("dds-1", "DeleteDBInstance"),
        );
        assert_eq!(
            err.to_string(),
            "[apsarastack_mongodb_sharding_instance.default] ApsaraStack API call failed: dds-1 DeleteDBInstance failed: MongoDB Instance dds-1 is not found"
        );
    }

    #[test]
    fn carry_over_keeps_existing_values() {
        let desired = Resource::new(MONGODB_SHARDING_INSTANCE, "default")
            .with_attribute("account_password", Value::from("secret"))
            .with_attribute("name", Value::from("desired"));
        let mut state = State::existing(
            desired.id.clone(),
            HashMap::from([("name".to_string(), Value::from("remote"))]),
        );

        carry_over(&mut state, &desired, &["account_password", "name"]);
        assert_eq!(state.attributes["account_password"], Value::from("secret"));
        assert_eq!(state.attributes["name"], Value::from("remote"));
    }
}

//! ApsaraStack provider implementation
//!
//! Dispatches resource operations to the per-type handlers in
//! [`crate::resources`] and [`crate::data_sources`], all of which share one
//! [`ApsaraStackClient`].

use std::sync::Arc;

use apsarastack_core::provider::{ProviderError, ProviderResult};
use apsarastack_core::resource::{Resource, ResourceId, State};
use log::info;

use crate::connectivity::{ApsaraStackClient, Config, SdkError};
use crate::data_sources::{adb_elastic_daily_plans, hbase_multimode_cms_url};
use crate::resources::{
    ADB_ELASTIC_DAILY_PLANS, ESS_SCALING_GROUP, HBASE_MULTIMODE_CMS_URL, MONGODB_SHARDING_INSTANCE,
    ess_scaling_group, mongodb_sharding_instance,
};

/// Account and default role of the configured credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account_id: String,
    pub role_id: i64,
}

fn unknown_type(resource_type: &str) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", resource_type))
}

/// ApsaraStack Provider
pub struct ApsaraStackProvider {
    client: Arc<ApsaraStackClient>,
}

impl ApsaraStackProvider {
    /// Create a provider from a resolved configuration
    pub fn new(config: Config) -> Result<Self, SdkError> {
        let client = ApsaraStackClient::new(config)?;
        info!("ApsaraStack provider configured for region {}", client.region_id);
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: ApsaraStackClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &ApsaraStackClient {
        &self.client
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read by identifier. `prior` is the state last recorded for the
    /// resource; reads that report configured values take them from it.
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match id.resource_type.as_str() {
            MONGODB_SHARDING_INSTANCE => {
                let configured = prior.map(|state| {
                    let mut resource = Resource::new(&id.resource_type, &id.name);
                    resource.attributes = state.attributes.clone();
                    resource
                });
                mongodb_sharding_instance::read(&self.client, id, identifier, configured.as_ref())
                    .await
            }
            ESS_SCALING_GROUP => ess_scaling_group::read(&self.client, id, identifier).await,
            other => Err(unknown_type(other).for_resource(id.clone())),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        match resource.id.resource_type.as_str() {
            MONGODB_SHARDING_INSTANCE => mongodb_sharding_instance::create(&self.client, resource).await,
            ESS_SCALING_GROUP => ess_scaling_group::create(&self.client, resource).await,
            other => Err(unknown_type(other).for_resource(resource.id.clone())),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            MONGODB_SHARDING_INSTANCE => {
                mongodb_sharding_instance::update(&self.client, id, identifier, from, to).await
            }
            ESS_SCALING_GROUP => {
                ess_scaling_group::update(&self.client, id, identifier, from, to).await
            }
            other => Err(unknown_type(other).for_resource(id.clone())),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            MONGODB_SHARDING_INSTANCE => {
                mongodb_sharding_instance::delete(&self.client, id, identifier).await
            }
            ESS_SCALING_GROUP => ess_scaling_group::delete(&self.client, id, identifier).await,
            other => Err(unknown_type(other).for_resource(id.clone())),
        }
    }

    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        match resource.id.resource_type.as_str() {
            HBASE_MULTIMODE_CMS_URL => hbase_multimode_cms_url::read(&self.client, resource).await,
            ADB_ELASTIC_DAILY_PLANS => adb_elastic_daily_plans::read(&self.client, resource).await,
            other => Err(unknown_type(other).for_resource(resource.id.clone())),
        }
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Resolve the caller's account and default role through ASCM
    pub async fn whoami(&self) -> ProviderResult<CallerIdentity> {
        let describe = |e: SdkError| ProviderError::new("unable to resolve caller identity").with_cause(e);
        let account_id = self.client.account_id().await.map_err(describe)?;
        let role_id = self.client.role_id().await.map_err(describe)?;
        Ok(CallerIdentity { account_id, role_id })
    }

    /// Remove scaling groups left behind by acceptance tests
    pub async fn sweep(&self, prefixes: &[&str]) -> ProviderResult<ess_scaling_group::SweepReport> {
        ess_scaling_group::sweep(&self.client, prefixes)
            .await
            .map_err(|e| ProviderError::new("Error retrieving Scaling groups").with_cause(e))
    }
}

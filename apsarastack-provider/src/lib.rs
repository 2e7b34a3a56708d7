//! ApsaraStack Provider
//!
//! Manages ApsaraStack resources through the products' RPC APIs.
//!
//! ## Module Structure
//!
//! - `connectivity` - Configuration, endpoint resolution and signed API calls
//! - `services` - Typed wrappers over the product APIs
//! - `resources` - Resource type definitions and handlers
//! - `data_sources` - Read-only data sources
//! - `provider` - ApsaraStackProvider implementation
//! - `retry` - Retry and status polling helpers
//! - `utils` - Helper functions shared by the handlers

pub mod connectivity;
pub mod data_sources;
pub mod provider;
pub mod resources;
pub mod retry;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export main types
pub use connectivity::{ApsaraStackClient, Config, ProviderSettings, SdkError};
pub use provider::{ApsaraStackProvider, CallerIdentity};
pub use resources::ess_scaling_group::{SWEEP_PREFIXES, SweepReport};

use apsarastack_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use apsarastack_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for ApsaraStackProvider {
    fn name(&self) -> &'static str {
        "apsarastack"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref(), None).await })
    }

    fn refresh(&self, prior: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let prior = prior.clone();
        Box::pin(async move {
            self.read_resource(&prior.id, prior.identifier.as_deref(), Some(&prior))
                .await
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}

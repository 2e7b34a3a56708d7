//! Keeping the state file in step with the provider

use std::collections::HashMap;

use apsarastack_core::effect::Effect;
use apsarastack_core::interpreter::{ApplyResult, EffectOutcome};
use apsarastack_core::plan::Plan;
use apsarastack_core::provider::Provider;
use apsarastack_core::resource::{ResourceId, State};
use apsarastack_state::{ResourceState, StateFile};
use log::debug;

/// Read every recorded resource again.
///
/// Attributes kept in the state file but not returned by the read
/// (passwords and other write-only inputs) are carried over. Resources that
/// no longer exist are dropped from `state`.
pub async fn refresh<P: Provider>(
    provider: &P,
    state: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();
    let mut gone = Vec::new();

    for recorded in &state.resources {
        let id = recorded.id();
        let prior = recorded.to_state();
        let fresh = provider
            .refresh(&prior)
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;

        if !fresh.exists {
            debug!("{} no longer exists", id);
            gone.push(id);
            continue;
        }

        let mut fresh = fresh;
        for (key, value) in prior.attributes {
            fresh.attributes.entry(key).or_insert(value);
        }
        current.insert(id, fresh);
    }

    for id in gone {
        state.remove_resource(&id.resource_type, &id.name);
    }
    for fresh in current.values() {
        state.upsert_resource(ResourceState::from_state(fresh));
    }
    Ok(current)
}

/// Record the outcome of each executed effect
pub fn record(state: &mut StateFile, plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        let Ok(outcome) = outcome else {
            continue;
        };
        match outcome {
            EffectOutcome::Created { state: s }
            | EffectOutcome::Updated { state: s }
            | EffectOutcome::Replaced { state: s } => {
                state.upsert_resource(ResourceState::from_state(s));
            }
            EffectOutcome::Deleted { id } => {
                state.remove_resource(&id.resource_type, &id.name);
            }
            EffectOutcome::Read { .. } | EffectOutcome::Skipped { .. } => {}
        }
        debug!("recorded {}", effect.resource_id());
    }
}

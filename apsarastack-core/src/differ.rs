//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in the manifest with the "current
//! state" fetched from the Provider, and generates a list of required
//! Effects (Plan). Comparison follows the attribute schema: sets ignore
//! order, maps and nested blocks only compare the keys that are declared,
//! suppressed differences are dropped and force-new changes replace.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete { id: ResourceId, identifier: String },
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forces_new: Vec<String> = changed
        .iter()
        .filter(|name| {
            schema
                .and_then(|s| s.attributes.get(name.as_str()))
                .is_some_and(|a| a.force_new)
        })
        .cloned()
        .collect();

    if forces_new.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: forces_new,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .keys()
        // Skip internal attributes (starting with _)
        .filter(|key| !key.starts_with('_'))
        .filter(|key| attribute_changed(key, desired, current, schema))
        .cloned()
        .collect();

    changed.sort();
    changed
}

/// Whether a declared attribute differs from state.
///
/// Attributes the manifest leaves out never count as changed.
pub fn attribute_changed(
    key: &str,
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> bool {
    let Some(desired_value) = desired.get(key) else {
        return false;
    };
    let attr = schema.and_then(|s| s.attributes.get(key));
    let current_value = current.get(key);

    if let Some(suppress) = attr.and_then(|a| a.diff_suppress)
        && suppress(current_value, Some(desired_value), desired)
    {
        return false;
    }

    match current_value {
        Some(current_value) => {
            !values_equal(attr.map(|a| &a.attr_type), desired_value, current_value)
        }
        None => true,
    }
}

/// Compare a desired value against the current one under an attribute type
pub fn values_equal(attr_type: Option<&AttributeType>, desired: &Value, current: &Value) -> bool {
    match (attr_type, desired, current) {
        (Some(AttributeType::Set(inner)), Value::List(want), Value::List(have)) => {
            let inner = Some(inner.as_ref());
            let want_unique = dedup(want);
            let have_unique = dedup(have);
            want_unique.len() == have_unique.len()
                && want_unique
                    .iter()
                    .all(|w| have_unique.iter().any(|h| values_equal(inner, w, h)))
        }
        (Some(AttributeType::List(inner)), Value::List(want), Value::List(have)) => {
            want.len() == have.len()
                && want
                    .iter()
                    .zip(have)
                    .all(|(w, h)| values_equal(Some(inner.as_ref()), w, h))
        }
        (Some(AttributeType::Object(fields)), Value::Map(want), Value::Map(have)) => {
            want.iter().all(|(k, w)| {
                let field_type = fields.iter().find(|f| &f.name == k).map(|f| &f.attr_type);
                have.get(k).is_some_and(|h| values_equal(field_type, w, h))
            })
        }
        (Some(AttributeType::Map(inner)), Value::Map(want), Value::Map(have)) => want
            .iter()
            .all(|(k, w)| {
                have.get(k)
                    .is_some_and(|h| values_equal(Some(inner.as_ref()), w, h))
            }),
        _ => desired == current,
    }
}

fn dedup(items: &[Value]) -> Vec<&Value> {
    let mut unique: Vec<&Value> = Vec::new();
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Data sources become Read effects. Resources recorded in state but absent
/// from the manifest are deleted after everything else.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete { id, identifier } => plan.add(Effect::Delete { id, identifier }),
        }
    }

    let declared: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !declared.contains(&s.id))
        .collect();
    orphans.sort_by_key(|s| s.id.to_string());
    for state in orphans {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}

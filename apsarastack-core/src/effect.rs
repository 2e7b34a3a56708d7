//! Effect - Side effects represented as values
//!
//! An Effect describes one operation against the cloud. Nothing happens
//! until an Interpreter executes it.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Evaluate a data source
    Read(Resource),
    /// Create a new resource
    Create(Resource),
    /// Update a resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete the existing resource and create it again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        /// Force-new attributes that triggered the replacement
        changed_attributes: Vec<String>,
    },
    /// Delete a resource by its cloud-side identifier
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    /// Whether executing this Effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_not_mutating() {
        let read = Effect::Read(Resource::new("apsarastack_hbase_multimode_cms_url", "cms"));
        let delete = Effect::Delete {
            id: ResourceId::new("apsarastack_ess_scaling_group", "default"),
            identifier: "asg-123".to_string(),
        };
        assert!(!read.is_mutating());
        assert!(delete.is_mutating());
        assert_eq!(delete.resource_id().name, "default");
    }
}

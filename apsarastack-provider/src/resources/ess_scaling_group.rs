//! apsarastack_ess_scaling_group

use std::collections::HashMap;

use apsarastack_core::provider::{ProviderError, ProviderResult};
use apsarastack_core::resource::{Resource, ResourceId, State, Value};
use apsarastack_core::schema::{AttributeSchema, AttributeType, Constraint, ResourceSchema};
use log::{error, info};

use super::{ESS_SCALING_GROUP, has_change, sdk_error};
use crate::connectivity::{ApsaraStackClient, RpcRequest, SdkError};
use crate::retry::{self, DELETED, RetryError};
use crate::services::EssService;
use crate::services::ess::{Attachment, ScalingGroup};

/// Name prefixes of groups left behind by acceptance tests
pub const SWEEP_PREFIXES: &[&str] = &["tf-testAcc", "tf_testAcc"];

const GROUP_BUSY: &[&str] = &[
    "IncorrectScalingGroupStatus",
    "ScalingActivityInProgress",
    "IncorrectLoadBalancerStatus",
];

pub fn schema() -> ResourceSchema {
    let strings = |values: &[&str]| values.iter().map(|s| s.to_string()).collect();

    ResourceSchema::new(ESS_SCALING_GROUP)
        .with_description("Auto Scaling group")
        .attribute(
            AttributeSchema::new("min_size", AttributeType::Int)
                .required()
                .with_constraint(Constraint::IntBetween(0, 1000))
                .with_provider_name("MinSize"),
        )
        .attribute(
            AttributeSchema::new("max_size", AttributeType::Int)
                .required()
                .with_constraint(Constraint::IntBetween(0, 1000))
                .with_provider_name("MaxSize"),
        )
        .attribute(
            AttributeSchema::new("scaling_group_name", AttributeType::String)
                .computed()
                .with_constraint(Constraint::LenBetween(2, 64))
                .with_provider_name("ScalingGroupName"),
        )
        .attribute(
            AttributeSchema::new("default_cooldown", AttributeType::Int)
                .with_default(Value::Int(300))
                .with_constraint(Constraint::IntBetween(0, 86400))
                .with_provider_name("DefaultCooldown"),
        )
        .attribute(AttributeSchema::new(
            "vswitch_ids",
            AttributeType::Set(Box::new(AttributeType::String)),
        ))
        .attribute(
            AttributeSchema::new(
                "removal_policies",
                AttributeType::List(Box::new(AttributeType::Enum(strings(&[
                    "OldestInstance",
                    "NewestInstance",
                    "OldestScalingConfiguration",
                ])))),
            )
            .computed()
            .with_constraint(Constraint::ItemsBetween(0, 2)),
        )
        .attribute(AttributeSchema::new(
            "loadbalancer_ids",
            AttributeType::Set(Box::new(AttributeType::String)),
        ))
        .attribute(AttributeSchema::new(
            "db_instance_ids",
            AttributeType::Set(Box::new(AttributeType::String)),
        ))
        .attribute(
            AttributeSchema::new(
                "multi_az_policy",
                AttributeType::Enum(strings(&["PRIORITY", "BALANCE", "COST_OPTIMIZED"])),
            )
            .force_new()
            .with_provider_name("MultiAZPolicy"),
        )
}

fn check_size(resource: &Resource) -> ProviderResult<()> {
    let min = resource.get_int("min_size").unwrap_or_default();
    let max = resource.get_int("max_size").unwrap_or_default();
    if min > max {
        return Err(ProviderError::new(format!(
            "\"min_size\" ({}) cannot be greater than \"max_size\" ({})",
            min, max
        ))
        .for_resource(resource.id.clone()));
    }
    Ok(())
}

/// Items of `a` missing from `b`, in the order of `a`
fn difference(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|item| !b.contains(item)).cloned().collect()
}

fn state_strings(state: &State, key: &str) -> Vec<String> {
    state
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn build_create_request(resource: &Resource) -> Result<RpcRequest, SdkError> {
    let mut request = RpcRequest::new("CreateScalingGroup")
        .param("MinSize", resource.get_int("min_size").unwrap_or_default())
        .param("MaxSize", resource.get_int("max_size").unwrap_or_default())
        .param(
            "DefaultCooldown",
            resource.get_int("default_cooldown").unwrap_or(300),
        )
        .param_opt("ScalingGroupName", Some(resource.get_str("scaling_group_name")))
        .param_opt("MultiAZPolicy", Some(resource.get_str("multi_az_policy")))
        .param_list("VSwitchIds", &resource.get_strings("vswitch_ids"))
        .param_list("RemovalPolicy", &resource.get_strings("removal_policies"));

    let lbs = resource.get_strings("loadbalancer_ids");
    if !lbs.is_empty() {
        request = request.param("LoadBalancerIds", serde_json::to_string(&lbs)?);
    }
    let dbs = resource.get_strings("db_instance_ids");
    if !dbs.is_empty() {
        request = request.param("DBInstanceIds", serde_json::to_string(&dbs)?);
    }
    Ok(request)
}

pub async fn create(client: &ApsaraStackClient, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    check_size(resource)?;

    let request = build_create_request(resource).map_err(|e| sdk_error(id, e))?;
    let group_id = EssService::new(client)
        .create_scaling_group(request)
        .await
        .map_err(|e| sdk_error(id, e))?;

    let state = read(client, id, &group_id).await?;
    if !state.exists {
        return Err(ProviderError::new(format!(
            "scaling group {} disappeared after creation",
            group_id
        ))
        .for_resource(id.clone()));
    }
    Ok(state)
}

fn group_attributes(group: ScalingGroup) -> HashMap<String, Value> {
    HashMap::from([
        ("min_size".to_string(), Value::Int(group.min_size)),
        ("max_size".to_string(), Value::Int(group.max_size)),
        ("scaling_group_name".to_string(), Value::from(group.scaling_group_name)),
        ("default_cooldown".to_string(), Value::Int(group.default_cooldown)),
        ("vswitch_ids".to_string(), Value::string_list(group.vswitch_ids.vswitch_id)),
        (
            "removal_policies".to_string(),
            Value::string_list(group.removal_policies.removal_policy),
        ),
        (
            "loadbalancer_ids".to_string(),
            Value::string_list(group.load_balancer_ids.load_balancer_id),
        ),
        (
            "db_instance_ids".to_string(),
            Value::string_list(group.db_instance_ids.db_instance_id),
        ),
        ("multi_az_policy".to_string(), Value::from(group.multi_az_policy)),
    ])
}

pub async fn read(client: &ApsaraStackClient, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
    match EssService::new(client).describe_scaling_group(identifier).await {
        Ok(group) => Ok(State::existing(id.clone(), group_attributes(group)).with_identifier(identifier)),
        Err(e) if e.is_not_found() => Ok(State::not_found(id.clone())),
        Err(e) => Err(sdk_error(id, e)),
    }
}

pub async fn update(
    client: &ApsaraStackClient,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    check_size(to)?;
    let schema = schema();
    let ess = EssService::new(client);

    let mut request = RpcRequest::new("ModifyScalingGroup").param("ScalingGroupId", identifier);
    let mut modified = false;
    for (key, param) in [
        ("scaling_group_name", "ScalingGroupName"),
        ("min_size", "MinSize"),
        ("max_size", "MaxSize"),
        ("default_cooldown", "DefaultCooldown"),
    ] {
        if has_change(&schema, from, to, key)
            && let Some(value) = to.attributes.get(key)
        {
            request = match value {
                Value::Int(i) => request.param(param, i),
                other => request.param_opt(param, other.as_str()),
            };
            modified = true;
        }
    }
    if has_change(&schema, from, to, "removal_policies") {
        request = request.param_list("RemovalPolicy", &to.get_strings("removal_policies"));
        modified = true;
    }
    if has_change(&schema, from, to, "vswitch_ids") {
        request = request.param_list("VSwitchIds", &to.get_strings("vswitch_ids"));
        modified = true;
    }
    if modified {
        ess.modify_scaling_group(request)
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    for (key, kind) in [
        ("loadbalancer_ids", Attachment::LoadBalancers),
        ("db_instance_ids", Attachment::DbInstances),
    ] {
        if !has_change(&schema, from, to, key) {
            continue;
        }
        let old = state_strings(from, key);
        let new = to.get_strings(key);
        ess.detach(identifier, kind, &difference(&old, &new))
            .await
            .map_err(|e| sdk_error(id, e))?;
        ess.attach(identifier, kind, &difference(&new, &old))
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    read(client, id, identifier).await
}

pub async fn delete(client: &ApsaraStackClient, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
    let ess = &EssService::new(client);

    let deleted = retry::retry(retry::DEFAULT_TIMEOUT, move || async move {
        ess.delete_scaling_group(identifier).await.map_err(|e| {
            if e.is_expected(GROUP_BUSY) || e.is_throttling_or_server() {
                RetryError::retryable(e)
            } else {
                RetryError::non_retryable(e)
            }
        })
    })
    .await;

    match deleted {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(sdk_error(id, e)),
    }

    retry::wait_for_status(
        identifier,
        DELETED,
        retry::DEFAULT_TIMEOUT,
        client.poll_interval(),
        move || async move {
            ess.describe_scaling_group(identifier)
                .await
                .map(|group| group.lifecycle_state)
        },
    )
    .await
    .map_err(|e| sdk_error(id, e))
}

/// Outcome of a sweep, as `name (id)` entries
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Force-delete every scaling group whose name starts with one of
/// `prefixes`, ignoring case. Failed deletions are logged and reported,
/// they do not stop the sweep.
pub async fn sweep(client: &ApsaraStackClient, prefixes: &[&str]) -> Result<SweepReport, SdkError> {
    let ess = EssService::new(client);
    let groups = ess.list_all_scaling_groups().await?;
    let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_lowercase()).collect();

    let mut report = SweepReport::default();
    for group in groups {
        let label = format!("{} ({})", group.scaling_group_name, group.scaling_group_id);
        let name = group.scaling_group_name.to_lowercase();
        if !prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            info!("Skipping Scaling Group: {}", label);
            report.skipped.push(label);
            continue;
        }

        info!("Deleting Scaling Group: {}", label);
        match ess.delete_scaling_group(&group.scaling_group_id).await {
            Ok(()) => report.deleted.push(label),
            Err(e) => {
                error!("Failed to delete Scaling Group ({}): {}", label, e);
                report.failed.push(label);
            }
        }
    }
    Ok(report)
}

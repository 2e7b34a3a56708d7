//! apsarastack_mongodb_sharding_instance
//!
//! A sharded MongoDB cluster: shard nodes, mongos routers and a fixed config
//! server. Create goes through `CreateShardingDBInstance`, node lists are
//! reconciled by position on update.

use std::collections::HashMap;
use std::time::Duration;

use apsarastack_core::provider::{ProviderError, ProviderResult};
use apsarastack_core::resource::{Resource, ResourceId, State, Value};
use apsarastack_core::schema::{AttributeSchema, AttributeType, Constraint, ResourceSchema};
use log::debug;

use super::{MONGODB_SHARDING_INSTANCE, carry_over, has_change, sdk_error, string_map};
use crate::connectivity::{ApsaraStackClient, RpcRequest, SdkError};
use crate::retry::{self, DELETED, RUNNING, RetryError};
use crate::services::dds::{DbInstance, NodeType, ShardingNode};
use crate::services::{DdsService, KmsService, VpcService};
use crate::utils::{
    PeriodUnit, backup_time_windows, build_client_token, compute_period_by_unit,
    join_security_ips, resolve_zone_for_vswitch, trim,
};

const ENGINE: &str = "MongoDB";
const CONFIG_SERVER_STORAGE: i64 = 20;
const CONFIG_SERVER_CLASS: &str = "dds.cs.mid";
const DELETE_TIMEOUT: Duration = Duration::from_secs(50 * 60);
const INSTANCE_NOT_FOUND: &str = "InvalidDBInstanceId.NotFound";

/// Accepted but never returned by the API
const WRITE_ONLY: &[&str] = &[
    "account_password",
    "kms_encrypted_password",
    "kms_encryption_context",
    "security_group_id",
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn str_value<'a>(v: Option<&'a Value>) -> &'a str {
    v.and_then(Value::as_str).unwrap_or_default()
}

fn suppress_unless_prepaid(
    _old: Option<&Value>,
    _new: Option<&Value>,
    desired: &HashMap<String, Value>,
) -> bool {
    str_value(desired.get("instance_charge_type")) != "PrePaid"
}

fn suppress_kms_password(
    _old: Option<&Value>,
    _new: Option<&Value>,
    desired: &HashMap<String, Value>,
) -> bool {
    !str_value(desired.get("account_password")).is_empty()
}

fn suppress_kms_context(
    _old: Option<&Value>,
    _new: Option<&Value>,
    desired: &HashMap<String, Value>,
) -> bool {
    str_value(desired.get("kms_encrypted_password")).is_empty()
}

fn suppress_tde_status(
    old: Option<&Value>,
    new: Option<&Value>,
    _desired: &HashMap<String, Value>,
) -> bool {
    let old = str_value(old);
    (old.is_empty() && str_value(new) == "disabled") || old == "enabled"
}

pub fn schema() -> ResourceSchema {
    let shard = vec![
        AttributeSchema::new("node_class", AttributeType::String).required(),
        AttributeSchema::new("node_storage", AttributeType::Int).required(),
        AttributeSchema::new("node_id", AttributeType::String).read_only(),
    ];
    let mongos = vec![
        AttributeSchema::new("node_class", AttributeType::String).required(),
        AttributeSchema::new("node_id", AttributeType::String).read_only(),
        AttributeSchema::new("connect_string", AttributeType::String).read_only(),
        AttributeSchema::new("port", AttributeType::Int).read_only(),
    ];

    ResourceSchema::new(MONGODB_SHARDING_INSTANCE)
        .with_description("Sharded MongoDB instance")
        .attribute(
            AttributeSchema::new("engine_version", AttributeType::String)
                .required()
                .force_new()
                .with_provider_name("EngineVersion"),
        )
        .attribute(
            AttributeSchema::new(
                "storage_engine",
                AttributeType::Enum(strings(&["WiredTiger", "RocksDB"])),
            )
            .computed()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "instance_charge_type",
                AttributeType::Enum(strings(&["PrePaid", "PostPaid"])),
            )
            .computed()
            .force_new()
            .with_provider_name("ChargeType"),
        )
        .attribute(
            AttributeSchema::new("period", AttributeType::Int)
                .computed()
                .with_constraint(Constraint::IntIn(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 24, 36]))
                .with_diff_suppress(suppress_unless_prepaid),
        )
        .attribute(AttributeSchema::new("zone_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("vswitch_id", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .with_constraint(Constraint::LenBetween(2, 256))
                .with_provider_name("DBInstanceDescription"),
        )
        .attribute(
            AttributeSchema::new(
                "security_ip_list",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .computed(),
        )
        .attribute(AttributeSchema::new("security_group_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("account_password", AttributeType::String).sensitive())
        .attribute(
            AttributeSchema::new("kms_encrypted_password", AttributeType::String)
                .with_diff_suppress(suppress_kms_password),
        )
        .attribute(
            AttributeSchema::new(
                "kms_encryption_context",
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .with_diff_suppress(suppress_kms_context),
        )
        .attribute(
            AttributeSchema::new(
                "tde_status",
                AttributeType::Enum(strings(&["enabled", "disabled"])),
            )
            .with_diff_suppress(suppress_tde_status),
        )
        .attribute(
            AttributeSchema::new(
                "backup_period",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .computed(),
        )
        .attribute(
            AttributeSchema::new("backup_time", AttributeType::Enum(backup_time_windows()))
                .computed(),
        )
        .attribute(AttributeSchema::new("retention_period", AttributeType::Int).read_only())
        .attribute(
            AttributeSchema::new(
                "shard_list",
                AttributeType::List(Box::new(AttributeType::Object(shard))),
            )
            .required()
            .with_constraint(Constraint::ItemsBetween(2, 32)),
        )
        .attribute(
            AttributeSchema::new(
                "mongo_list",
                AttributeType::List(Box::new(AttributeType::Object(mongos))),
            )
            .required()
            .with_constraint(Constraint::ItemsBetween(2, 32)),
        )
}

/// Node entries of `shard_list` or `mongo_list`
fn nodes(value: Option<&Value>, node_type: NodeType) -> Vec<ShardingNode> {
    value
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_map)
        .map(|node| ShardingNode {
            node_id: str_value(node.get("node_id")).to_string(),
            node_class: str_value(node.get("node_class")).to_string(),
            node_storage: match node_type {
                NodeType::Shard => node.get("node_storage").and_then(Value::as_int),
                NodeType::Mongos => None,
            },
        })
        .collect()
}

/// The account password, decrypting `kms_encrypted_password` when no
/// plaintext password is configured
async fn resolve_password(client: &ApsaraStackClient, resource: &Resource) -> Result<String, SdkError> {
    let password = resource.get_str("account_password");
    if !password.is_empty() {
        return Ok(password.to_string());
    }

    let encrypted = resource.get_str("kms_encrypted_password");
    if encrypted.is_empty() {
        return Ok(String::new());
    }
    let context = string_map(resource.attributes.get("kms_encryption_context"));
    let decrypted = KmsService::new(client).decrypt(encrypted, &context).await?;
    Ok(decrypted.plaintext)
}

pub(crate) async fn build_create_request(
    client: &ApsaraStackClient,
    resource: &Resource,
) -> ProviderResult<RpcRequest> {
    let id = &resource.id;
    let password = resolve_password(client, resource)
        .await
        .map_err(|e| sdk_error(id, e))?;

    let mut request = RpcRequest::new("CreateShardingDBInstance")
        .param("Engine", ENGINE)
        .param("EngineVersion", trim(resource.get_str("engine_version")))
        .param_opt("DBInstanceDescription", Some(resource.get_str("name")))
        .param_opt("AccountPassword", Some(password))
        .param_opt("StorageEngine", Some(resource.get_str("storage_engine")));

    for (i, shard) in nodes(resource.attributes.get("shard_list"), NodeType::Shard)
        .iter()
        .enumerate()
    {
        request = request
            .param(
                format!("ReplicaSet.{}.Storage", i + 1),
                shard.node_storage.unwrap_or_default(),
            )
            .param(format!("ReplicaSet.{}.Class", i + 1), &shard.node_class);
    }
    for (i, mongos) in nodes(resource.attributes.get("mongo_list"), NodeType::Mongos)
        .iter()
        .enumerate()
    {
        request = request.param(format!("Mongos.{}.Class", i + 1), &mongos.node_class);
    }
    request = request
        .param("ConfigServer.1.Storage", CONFIG_SERVER_STORAGE)
        .param("ConfigServer.1.Class", CONFIG_SERVER_CLASS);

    let mut zone_id = resource.get_str("zone_id").to_string();
    let vswitch_id = trim(resource.get_str("vswitch_id"));
    if vswitch_id.is_empty() {
        request = request.param("NetworkType", "Classic");
    } else {
        let vsw = VpcService::new(client)
            .describe_vswitch(&vswitch_id)
            .await
            .map_err(|e| sdk_error(id, e))?;
        zone_id = resolve_zone_for_vswitch(&zone_id, &vsw.vswitch_id, &vsw.zone_id)
            .map_err(|msg| ProviderError::new(msg).for_resource(id.clone()))?;
        request = request
            .param("NetworkType", "VPC")
            .param("VSwitchId", &vswitch_id)
            .param("VpcId", &vsw.vpc_id);
    }
    request = request.param_opt("ZoneId", Some(zone_id));

    let charge_type = resource.get_str("instance_charge_type");
    request = request.param_opt("ChargeType", Some(charge_type));
    if charge_type == "PrePaid"
        && let Some(period) = resource.get_int("period")
    {
        request = request.param("Period", period);
    }

    request = request
        .param(
            "SecurityIPList",
            join_security_ips(&resource.get_strings("security_ip_list")),
        )
        .param("ClientToken", build_client_token("CreateShardingDBInstance"));

    Ok(request)
}

pub async fn create(client: &ApsaraStackClient, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let request = build_create_request(client, resource).await?;

    let dds = DdsService::new(client);
    let instance_id = dds
        .create_sharding_instance(request)
        .await
        .map_err(|e| sdk_error(id, e))?;
    debug!("created {} as {}", id, instance_id);

    dds.wait_for_instance(&instance_id, RUNNING, retry::DEFAULT_LONG_TIMEOUT)
        .await
        .map_err(|e| sdk_error(id, e))?;

    let created = State::not_found(id.clone()).with_identifier(&instance_id);
    apply_settings(client, id, &instance_id, &created, resource).await?;

    let mut state = read(client, id, &instance_id, Some(resource)).await?;
    carry_over(&mut state, resource, WRITE_ONLY);
    Ok(state)
}

/// Backup policy, TDE and security group; the only settings applied right
/// after creation
async fn apply_settings(
    client: &ApsaraStackClient,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<()> {
    let schema = schema();
    let dds = DdsService::new(client);

    if has_change(&schema, from, to, "backup_time") || has_change(&schema, from, to, "backup_period") {
        let mut time = to.get_str("backup_time").to_string();
        let mut period = to.get_strings("backup_period");
        if time.is_empty() || period.is_empty() {
            let current = dds
                .describe_backup_policy(identifier)
                .await
                .map_err(|e| sdk_error(id, e))?;
            if time.is_empty() {
                time = current.preferred_backup_time.clone();
            }
            if period.is_empty() {
                period = current.backup_period();
            }
        }
        dds.modify_backup_policy(identifier, &time, &period)
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    if has_change(&schema, from, to, "tde_status") {
        dds.modify_tde(identifier, to.get_str("tde_status"))
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    if has_change(&schema, from, to, "security_group_id") {
        dds.modify_security_group(identifier, to.get_str("security_group_id"))
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    Ok(())
}

/// Read the instance; a missing instance yields `State::not_found`.
///
/// `desired` supplies the configured period and TDE status, which decide
/// how the remote values are reported. On refresh it is the recorded state.
pub async fn read(
    client: &ApsaraStackClient,
    id: &ResourceId,
    identifier: &str,
    desired: Option<&Resource>,
) -> ProviderResult<State> {
    let dds = DdsService::new(client);

    let instance = match dds.describe_instance(identifier).await {
        Ok(instance) => instance,
        Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
        Err(e) => return Err(sdk_error(id, e)),
    };

    let mut attributes = instance_attributes(&instance, desired)
        .map_err(|msg| ProviderError::new(msg).for_resource(id.clone()))?;

    let policy = dds
        .describe_backup_policy(identifier)
        .await
        .map_err(|e| sdk_error(id, e))?;
    attributes.insert(
        "backup_time".to_string(),
        Value::from(policy.preferred_backup_time.as_str()),
    );
    attributes.insert(
        "backup_period".to_string(),
        Value::string_list(policy.backup_period()),
    );
    attributes.insert(
        "retention_period".to_string(),
        Value::Int(policy.retention_period()),
    );

    let tde = dds
        .describe_tde_info(identifier)
        .await
        .map_err(|e| sdk_error(id, e))?;
    let desired_tde = desired.map(|r| r.get_str("tde_status")).unwrap_or_default();
    if !(desired_tde.is_empty() && tde.tde_status == "disabled") {
        attributes.insert("tde_status".to_string(), Value::from(tde.tde_status));
    }

    let ips = dds
        .describe_security_ips(identifier)
        .await
        .map_err(|e| sdk_error(id, e))?;
    attributes.insert("security_ip_list".to_string(), Value::string_list(ips));

    Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
}

fn instance_attributes(
    instance: &DbInstance,
    desired: Option<&Resource>,
) -> Result<HashMap<String, Value>, String> {
    let mut attributes = HashMap::new();
    let mut set = |k: &str, v: Value| {
        attributes.insert(k.to_string(), v);
    };

    set("name", Value::from(instance.db_instance_description.as_str()));
    set("engine_version", Value::from(instance.engine_version.as_str()));
    set("storage_engine", Value::from(instance.storage_engine.as_str()));
    set("zone_id", Value::from(instance.zone_id.as_str()));
    set("instance_charge_type", Value::from(instance.charge_type.as_str()));
    if instance.charge_type == "PrePaid" {
        let configured = desired.and_then(|r| r.get_int("period")).unwrap_or(0);
        let period = compute_period_by_unit(
            &instance.creation_time,
            &instance.expire_time,
            configured,
            PeriodUnit::Month,
        )?;
        set("period", Value::Int(period));
    }
    set("vswitch_id", Value::from(instance.vswitch_id.as_str()));

    let mongos = instance
        .mongos_list
        .mongos_attribute
        .iter()
        .map(|m| {
            Value::Map(HashMap::from([
                ("node_class".to_string(), Value::from(m.node_class.as_str())),
                ("node_id".to_string(), Value::from(m.node_id.as_str())),
                ("port".to_string(), Value::Int(m.port)),
                ("connect_string".to_string(), Value::from(m.connect_sting.as_str())),
            ]))
        })
        .collect();
    set("mongo_list", Value::List(mongos));

    let shards = instance
        .shard_list
        .shard_attribute
        .iter()
        .map(|s| {
            Value::Map(HashMap::from([
                ("node_id".to_string(), Value::from(s.node_id.as_str())),
                ("node_storage".to_string(), Value::Int(s.node_storage)),
                ("node_class".to_string(), Value::from(s.node_class.as_str())),
            ]))
        })
        .collect();
    set("shard_list", Value::List(shards));

    Ok(attributes)
}

pub async fn update(
    client: &ApsaraStackClient,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let schema = schema();
    let dds = DdsService::new(client);

    apply_settings(client, id, identifier, from, to).await?;

    for (key, node_type) in [("shard_list", NodeType::Shard), ("mongo_list", NodeType::Mongos)] {
        if has_change(&schema, from, to, key) {
            dds.modify_sharding_nodes(
                identifier,
                node_type,
                &nodes(from.attributes.get(key), node_type),
                &nodes(to.attributes.get(key), node_type),
            )
            .await
            .map_err(|e| sdk_error(id, e))?;
        }
    }

    if has_change(&schema, from, to, "name") {
        dds.modify_description(identifier, to.get_str("name"))
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    if has_change(&schema, from, to, "account_password")
        || has_change(&schema, from, to, "kms_encrypted_password")
    {
        let password = resolve_password(client, to)
            .await
            .map_err(|e| sdk_error(id, e))?;
        if password.is_empty() {
            return Err(ProviderError::new(
                "account_password or kms_encrypted_password is required to reset the password",
            )
            .for_resource(id.clone()));
        }
        dds.reset_account_password(identifier, &password)
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    if has_change(&schema, from, to, "security_ip_list") {
        let ips = join_security_ips(&to.get_strings("security_ip_list"));
        dds.modify_security_ips(identifier, &ips)
            .await
            .map_err(|e| sdk_error(id, e))?;
    }

    let mut state = read(client, id, identifier, Some(to)).await?;
    carry_over(&mut state, to, WRITE_ONLY);
    Ok(state)
}

pub async fn delete(client: &ApsaraStackClient, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
    let dds = &DdsService::new(client);

    let deleted = retry::retry(DELETE_TIMEOUT, move || async move {
        dds.delete_instance(identifier).await.map_err(|e| {
            if e.is_expected(&[INSTANCE_NOT_FOUND]) {
                RetryError::non_retryable(e)
            } else {
                RetryError::retryable(e)
            }
        })
    })
    .await;

    match deleted {
        Ok(()) => {}
        Err(e) if e.is_expected(&[INSTANCE_NOT_FOUND]) => return Ok(()),
        Err(e) => return Err(sdk_error(id, e)),
    }

    dds.wait_for_instance(identifier, DELETED, retry::DEFAULT_TIMEOUT)
        .await
        .map_err(|e| sdk_error(id, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, RecordedRequest, client_for};
    use apsarastack_core::differ::{self, Diff};
    use serde_json::json;

    fn node_list(items: &[(&str, Option<i64>)]) -> Value {
        Value::List(
            items
                .iter()
                .map(|(class, storage)| {
                    let mut node = HashMap::from([("node_class".to_string(), Value::from(*class))]);
                    if let Some(storage) = storage {
                        node.insert("node_storage".to_string(), Value::Int(*storage));
                    }
                    Value::Map(node)
                })
                .collect(),
        )
    }

    fn desired() -> Resource {
        Resource::new(MONGODB_SHARDING_INSTANCE, "default")
            .with_attribute("engine_version", Value::from("3.4"))
            .with_attribute("name", Value::from("tf-testAccMongoDBShardingInstance"))
            .with_attribute(
                "shard_list",
                node_list(&[("dds.shard.mid", Some(10)), ("dds.shard.mid", Some(10))]),
            )
            .with_attribute(
                "mongo_list",
                node_list(&[("dds.mongos.mid", None), ("dds.mongos.mid", None)]),
            )
    }

    fn instance_json(status: &str) -> serde_json::Value {
        json!({ "DBInstances": { "DBInstance": [{
            "DBInstanceId": "dds-1",
            "DBInstanceDescription": "tf-testAccMongoDBShardingInstance",
            "DBInstanceStatus": status,
            "EngineVersion": "3.4",
            "StorageEngine": "WiredTiger",
            "ZoneId": "cn-qingdao-env66-amtest66001-a",
            "ChargeType": "PostPaid",
            "VSwitchId": "vsw-1",
            "MongosList": { "MongosAttribute": [
                { "NodeId": "s-1", "NodeClass": "dds.mongos.mid", "ConnectSting": "s-1.mongodb", "Port": 3717 },
                { "NodeId": "s-2", "NodeClass": "dds.mongos.mid", "ConnectSting": "s-2.mongodb", "Port": 3717 },
            ]},
            "ShardList": { "ShardAttribute": [
                { "NodeId": "d-1", "NodeClass": "dds.shard.mid", "NodeStorage": 10 },
                { "NodeId": "d-2", "NodeClass": "dds.shard.mid", "NodeStorage": 10 },
            ]},
        }]}})
    }

    /// Responds like a dds/vpc/kms backend holding one running instance
    fn backend(req: &RecordedRequest) -> (u16, serde_json::Value) {
        match req.action() {
            "CreateShardingDBInstance" => (200, json!({ "DBInstanceId": "dds-1" })),
            "DescribeDBInstanceAttribute" => (200, instance_json("Running")),
            "DescribeBackupPolicy" => (
                200,
                json!({
                    "PreferredBackupTime": "02:00Z-03:00Z",
                    "PreferredBackupPeriod": "Monday,Wednesday",
                    "BackupRetentionPeriod": "7",
                }),
            ),
            "DescribeDBInstanceTDEInfo" => (200, json!({ "TDEStatus": "disabled" })),
            "DescribeSecurityIps" => (
                200,
                json!({ "SecurityIpGroups": { "SecurityIpGroup": [
                    { "SecurityIpGroupAttribute": "", "SecurityIpList": "127.0.0.1" },
                ]}}),
            ),
            "DescribeVSwitchAttributes" => (
                200,
                json!({ "VSwitchId": "vsw-1", "VpcId": "vpc-1", "ZoneId": "cn-qingdao-env66-amtest66001-a" }),
            ),
            "Decrypt" => (200, json!({ "Plaintext": "Decrypted1" })),
            _ => (200, json!({ "RequestId": "r" })),
        }
    }

    #[tokio::test]
    async fn create_sends_sharding_request_and_reads_back() {
        let server = MockServer::start(backend).await;
        let client = client_for(&server);

        let resource = desired()
            .with_attribute("vswitch_id", Value::from("vsw-1"))
            .with_attribute("kms_encrypted_password", Value::from("blob=="));
        let state = create(&client, &resource).await.unwrap();

        let sent = &server.requests_for("CreateShardingDBInstance")[0];
        assert_eq!(sent.param("Engine"), Some("MongoDB"));
        assert_eq!(sent.param("EngineVersion"), Some("3.4"));
        assert_eq!(sent.param("AccountPassword"), Some("Decrypted1"));
        assert_eq!(sent.param("ReplicaSet.2.Storage"), Some("10"));
        assert_eq!(sent.param("Mongos.2.Class"), Some("dds.mongos.mid"));
        assert_eq!(sent.param("ConfigServer.1.Storage"), Some("20"));
        assert_eq!(sent.param("ConfigServer.1.Class"), Some("dds.cs.mid"));
        assert_eq!(sent.param("NetworkType"), Some("VPC"));
        assert_eq!(sent.param("VpcId"), Some("vpc-1"));
        assert_eq!(sent.param("ZoneId"), Some("cn-qingdao-env66-amtest66001-a"));
        assert_eq!(sent.param("SecurityIPList"), Some("127.0.0.1"));
        assert_eq!(sent.param("Period"), None);
        assert!(sent.param("ClientToken").is_some_and(|t| t.len() <= 64));

        let actions = server.actions();
        assert!(!actions.iter().any(|a| a.starts_with("Modify")));

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("dds-1"));
        assert_eq!(state.attributes["retention_period"], Value::Int(7));
        assert_eq!(
            state.attributes["backup_period"],
            Value::string_list(["Monday", "Wednesday"])
        );
        assert!(!state.attributes.contains_key("tde_status"));
        assert_eq!(
            state.attributes["kms_encrypted_password"],
            Value::from("blob==")
        );

        let schema = schema();
        assert_eq!(
            differ::diff(&resource, &state, Some(&schema)),
            Diff::NoChange(resource.id.clone())
        );
    }

    #[tokio::test]
    async fn create_applies_configured_settings() {
        let server = MockServer::start(backend).await;
        let client = client_for(&server);

        let resource = desired()
            .with_attribute("backup_time", Value::from("05:00Z-06:00Z"))
            .with_attribute("tde_status", Value::from("enabled"))
            .with_attribute("security_ip_list", Value::string_list(["10.0.0.1", "10.0.0.2"]));
        create(&client, &resource).await.unwrap();

        let sent = &server.requests_for("CreateShardingDBInstance")[0];
        assert_eq!(sent.param("NetworkType"), Some("Classic"));
        assert_eq!(sent.param("SecurityIPList"), Some("10.0.0.1,10.0.0.2"));

        let backup = &server.requests_for("ModifyBackupPolicy")[0];
        assert_eq!(backup.param("PreferredBackupTime"), Some("05:00Z-06:00Z"));
        assert_eq!(backup.param("PreferredBackupPeriod"), Some("Monday,Wednesday"));
        assert_eq!(
            server.requests_for("ModifyDBInstanceTDE")[0].param("TDEStatus"),
            Some("enabled")
        );
        assert!(server.requests_for("ModifySecurityIps").is_empty());
    }

    #[tokio::test]
    async fn vswitch_outside_zone_is_rejected() {
        let server = MockServer::start(backend).await;
        let client = client_for(&server);

        let resource = desired()
            .with_attribute("vswitch_id", Value::from("vsw-1"))
            .with_attribute("zone_id", Value::from("cn-qingdao-env66-amtest66001-b"));
        let err = create(&client, &resource).await.unwrap_err();

        assert!(err
            .to_string()
            .contains("The specified vswitch vsw-1 isn't in the zone cn-qingdao-env66-amtest66001-b"));
        assert!(server.requests_for("CreateShardingDBInstance").is_empty());
    }

    #[tokio::test]
    async fn read_of_missing_instance_is_not_found() {
        let server = MockServer::start(|_| {
            (
                404,
                json!({ "Code": "InvalidDBInstanceId.NotFound", "Message": "not found" }),
            )
        })
        .await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        let state = read(&client, &id, "dds-gone", None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn read_reports_prepaid_period() {
        let server = MockServer::start(|req| match req.action() {
            "DescribeDBInstanceAttribute" => (
                200,
                json!({ "DBInstances": { "DBInstance": [{
                    "DBInstanceId": "dds-1",
                    "DBInstanceStatus": "Running",
                    "ChargeType": "PrePaid",
                    "CreationTime": "2020-01-01T00:00Z",
                    "ExpireTime": "2020-07-01T00:00Z",
                }]}}),
            ),
            "DescribeDBInstanceTDEInfo" => (200, json!({ "TDEStatus": "enabled" })),
            _ => (200, json!({})),
        })
        .await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        let state = read(&client, &id, "dds-1", None).await.unwrap();
        assert_eq!(state.attributes["period"], Value::Int(6));
        assert_eq!(state.attributes["tde_status"], Value::from("enabled"));
        assert_eq!(state.attributes["security_ip_list"], Value::List(vec![]));
    }

    #[tokio::test]
    async fn update_rejects_an_empty_password() {
        let server = MockServer::start(backend).await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        let mut from = read(&client, &id, "dds-1", None).await.unwrap();
        from.attributes
            .insert("account_password".to_string(), Value::from("0ldPassword"));
        let to = desired().with_attribute("account_password", Value::from(""));

        let err = update(&client, &id, "dds-1", &from, &to).await.unwrap_err();
        assert!(err.to_string().contains("account_password or kms_encrypted_password is required"));
        assert!(server.requests_for("ResetAccountPassword").is_empty());
    }

    #[tokio::test]
    async fn update_applies_changes_in_order() {
        let server = MockServer::start(backend).await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        let from = read(&client, &id, "dds-1", None).await.unwrap();
        let to = desired()
            .with_attribute("name", Value::from("renamed"))
            .with_attribute("backup_period", Value::string_list(["Friday"]))
            .with_attribute("security_ip_list", Value::string_list(["10.0.0.0/8"]))
            .with_attribute("account_password", Value::from("N3wPassword"))
            .with_attribute(
                "shard_list",
                node_list(&[
                    ("dds.shard.mid", Some(10)),
                    ("dds.shard.mid", Some(10)),
                    ("dds.shard.mid", Some(20)),
                ]),
            );
        let before = server.requests().len();

        let state = update(&client, &id, "dds-1", &from, &to).await.unwrap();
        assert_eq!(state.attributes["account_password"], Value::from("N3wPassword"));

        let mutations: Vec<String> = server.actions()[before..]
            .iter()
            .filter(|a| !a.starts_with("Describe"))
            .cloned()
            .collect();
        assert_eq!(
            mutations,
            vec![
                "ModifyBackupPolicy",
                "CreateNode",
                "ModifyDBInstanceDescription",
                "ResetAccountPassword",
                "ModifySecurityIps",
            ]
        );

        let backup = &server.requests_for("ModifyBackupPolicy")[0];
        assert_eq!(backup.param("PreferredBackupTime"), Some("02:00Z-03:00Z"));
        assert_eq!(backup.param("PreferredBackupPeriod"), Some("Friday"));
        let node = &server.requests_for("CreateNode")[0];
        assert_eq!(node.param("NodeType"), Some("shard"));
        assert_eq!(node.param("NodeStorage"), Some("20"));
        let reset = &server.requests_for("ResetAccountPassword")[0];
        assert_eq!(reset.param("AccountName"), Some("root"));
    }

    #[tokio::test]
    async fn delete_treats_missing_instance_as_gone() {
        let server = MockServer::start(|_| {
            (
                404,
                json!({ "Code": "InvalidDBInstanceId.NotFound", "Message": "not found" }),
            )
        })
        .await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        delete(&client, &id, "dds-1").await.unwrap();
        assert_eq!(server.actions(), vec!["DeleteDBInstance"]);
    }

    #[tokio::test]
    async fn delete_waits_until_instance_disappears() {
        let server = MockServer::start(|req| match (req.action(), req.sequence) {
            ("DeleteDBInstance", _) => (200, json!({ "RequestId": "r" })),
            ("DescribeDBInstanceAttribute", 1) => (200, instance_json("Deleting")),
            _ => (
                404,
                json!({ "Code": "InvalidDBInstanceId.NotFound", "Message": "not found" }),
            ),
        })
        .await;
        let client = client_for(&server);
        let id = ResourceId::new(MONGODB_SHARDING_INSTANCE, "default");

        delete(&client, &id, "dds-1").await.unwrap();
        assert_eq!(
            server.actions(),
            vec!["DeleteDBInstance", "DescribeDBInstanceAttribute", "DescribeDBInstanceAttribute"]
        );
    }

    #[test]
    fn suppressions_follow_sibling_attributes() {
        let schema = schema();
        let current = State::existing(
            ResourceId::new(MONGODB_SHARDING_INSTANCE, "default"),
            HashMap::from([
                ("period".to_string(), Value::Int(1)),
                ("tde_status".to_string(), Value::from("enabled")),
            ]),
        );

        let postpaid = Resource::new(MONGODB_SHARDING_INSTANCE, "default")
            .with_attribute("instance_charge_type", Value::from("PostPaid"))
            .with_attribute("period", Value::Int(12))
            .with_attribute("tde_status", Value::from("disabled"))
            .with_attribute("account_password", Value::from("x"))
            .with_attribute("kms_encrypted_password", Value::from("blob"));
        for key in ["period", "tde_status", "kms_encrypted_password"] {
            assert!(!has_change(&schema, &current, &postpaid, key), "{}", key);
        }

        let prepaid = postpaid.with_attribute("instance_charge_type", Value::from("PrePaid"));
        assert!(has_change(&schema, &current, &prepaid, "period"));
    }

    #[test]
    fn schema_validates_node_lists() {
        let schema = schema();
        let mut attributes = desired().attributes;
        assert!(schema.validate(&attributes).is_ok());

        attributes.insert("shard_list".to_string(), node_list(&[("dds.shard.mid", Some(10))]));
        attributes.insert("period".to_string(), Value::Int(10));
        let errors = schema.validate(&attributes).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}

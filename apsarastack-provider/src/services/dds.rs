//! MongoDB (dds) API calls

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

use super::{number_or_string, string_or_number};
use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, SdkError, ServiceCode};
use crate::retry::{self, RUNNING};
use crate::utils::build_client_token;

/// Security IP groups with this attribute are managed by the platform
const HIDDEN_GROUP: &str = "hidden";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DbInstance {
    #[serde(rename = "DBInstanceId")]
    pub db_instance_id: String,
    #[serde(rename = "DBInstanceDescription")]
    pub db_instance_description: String,
    #[serde(rename = "DBInstanceStatus")]
    pub db_instance_status: String,
    pub engine_version: String,
    pub storage_engine: String,
    pub zone_id: String,
    pub charge_type: String,
    pub creation_time: String,
    pub expire_time: String,
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
    pub mongos_list: MongosList,
    pub shard_list: ShardList,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MongosList {
    pub mongos_attribute: Vec<MongosAttribute>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MongosAttribute {
    pub node_id: String,
    pub node_class: String,
    /// Spelled this way by the API
    pub connect_sting: String,
    #[serde(deserialize_with = "number_or_string")]
    pub port: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ShardList {
    pub shard_attribute: Vec<ShardAttribute>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ShardAttribute {
    pub node_id: String,
    pub node_class: String,
    #[serde(deserialize_with = "number_or_string")]
    pub node_storage: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeDbInstanceAttributeResponse {
    #[serde(rename = "DBInstances")]
    db_instances: DbInstances,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DbInstances {
    #[serde(rename = "DBInstance")]
    db_instance: Vec<DbInstance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackupPolicy {
    pub preferred_backup_time: String,
    pub preferred_backup_period: String,
    #[serde(deserialize_with = "string_or_number")]
    pub backup_retention_period: String,
}

impl BackupPolicy {
    /// Comma-separated weekdays as a list
    pub fn backup_period(&self) -> Vec<String> {
        self.preferred_backup_period
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn retention_period(&self) -> i64 {
        self.backup_retention_period.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TdeInfo {
    #[serde(rename = "TDEStatus")]
    pub tde_status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeSecurityIpsResponse {
    security_ip_groups: SecurityIpGroups,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SecurityIpGroups {
    security_ip_group: Vec<SecurityIpGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SecurityIpGroup {
    security_ip_group_attribute: String,
    security_ip_list: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateShardingResponse {
    #[serde(rename = "DBInstanceId")]
    db_instance_id: String,
}

/// Kind of node inside a sharding instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Shard,
    Mongos,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Shard => "shard",
            NodeType::Mongos => "mongos",
        }
    }
}

/// A shard or mongos node as declared or as read back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardingNode {
    pub node_id: String,
    pub node_class: String,
    /// Only shards carry storage
    pub node_storage: Option<i64>,
}

/// One API call needed to bring the node list in line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    Create(ShardingNode),
    Delete(String),
    Modify { node_id: String, node: ShardingNode },
}

/// Diff node lists by position: extra desired nodes are created, extra
/// current nodes deleted, and aligned nodes with a different class or
/// storage modified.
pub fn plan_node_changes(current: &[ShardingNode], desired: &[ShardingNode]) -> Vec<NodeChange> {
    let mut changes = Vec::new();
    let aligned = current.len().min(desired.len());

    for node in &desired[aligned..] {
        changes.push(NodeChange::Create(node.clone()));
    }
    for node in &current[aligned..] {
        changes.push(NodeChange::Delete(node.node_id.clone()));
    }
    for (cur, want) in current[..aligned].iter().zip(&desired[..aligned]) {
        if cur.node_class != want.node_class || cur.node_storage != want.node_storage {
            changes.push(NodeChange::Modify {
                node_id: cur.node_id.clone(),
                node: want.clone(),
            });
        }
    }
    changes
}

pub struct DdsService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> DdsService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    async fn call(&self, id: &str, request: RpcRequest) -> Result<serde_json::Value> {
        let action = request.action.clone();
        let dds = self.client.service(ServiceCode::Dds).await?;
        dds.call(request).await.map_err(|e| e.context(id, action))
    }

    pub async fn create_sharding_instance(&self, request: RpcRequest) -> Result<String> {
        let dds = self.client.service(ServiceCode::Dds).await?;
        let response: CreateShardingResponse = dds
            .call_as(request)
            .await
            .map_err(|e| e.context("apsarastack_mongodb_sharding_instance", "CreateShardingDBInstance"))?;
        if response.db_instance_id.is_empty() {
            return Err(SdkError::Config(
                "CreateShardingDBInstance returned no DBInstanceId".to_string(),
            ));
        }
        Ok(response.db_instance_id)
    }

    pub async fn describe_instance(&self, id: &str) -> Result<DbInstance> {
        let body = self
            .call(
                id,
                RpcRequest::new("DescribeDBInstanceAttribute").param("DBInstanceId", id),
            )
            .await?;
        let response: DescribeDbInstanceAttributeResponse = serde_json::from_value(body)?;
        response
            .db_instances
            .db_instance
            .into_iter()
            .next()
            .ok_or_else(|| SdkError::not_found("MongoDB Instance", id))
    }

    pub async fn wait_for_instance(&self, id: &str, status: &str, timeout: Duration) -> Result<()> {
        retry::wait_for_status(id, status, timeout, self.client.poll_interval(), move || async move {
            self.describe_instance(id)
                .await
                .map(|instance| instance.db_instance_status)
        })
        .await
    }

    pub async fn describe_backup_policy(&self, id: &str) -> Result<BackupPolicy> {
        let body = self
            .call(id, RpcRequest::new("DescribeBackupPolicy").param("DBInstanceId", id))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn modify_backup_policy(&self, id: &str, time: &str, period: &[String]) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ModifyBackupPolicy")
                .param("DBInstanceId", id)
                .param("PreferredBackupTime", time)
                .param("PreferredBackupPeriod", period.join(",")),
        )
        .await?;
        self.wait_for_instance(id, RUNNING, retry::DEFAULT_TIMEOUT).await
    }

    pub async fn describe_tde_info(&self, id: &str) -> Result<TdeInfo> {
        let body = self
            .call(
                id,
                RpcRequest::new("DescribeDBInstanceTDEInfo").param("DBInstanceId", id),
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn modify_tde(&self, id: &str, status: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ModifyDBInstanceTDE")
                .param("DBInstanceId", id)
                .param("TDEStatus", status),
        )
        .await
        .map(|_| ())
    }

    pub async fn modify_security_group(&self, id: &str, group_id: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ModifySecurityGroupConfiguration")
                .param("DBInstanceId", id)
                .param("SecurityGroupId", group_id),
        )
        .await
        .map(|_| ())
    }

    pub async fn modify_description(&self, id: &str, description: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ModifyDBInstanceDescription")
                .param("DBInstanceId", id)
                .param("DBInstanceDescription", description),
        )
        .await
        .map(|_| ())
    }

    pub async fn reset_account_password(&self, id: &str, password: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ResetAccountPassword")
                .param("DBInstanceId", id)
                .param("AccountName", "root")
                .param("AccountPassword", password),
        )
        .await?;
        self.wait_for_instance(id, RUNNING, retry::DEFAULT_TIMEOUT).await
    }

    /// Union of the non-hidden security IP groups, sorted and deduplicated
    pub async fn describe_security_ips(&self, id: &str) -> Result<Vec<String>> {
        let body = self
            .call(id, RpcRequest::new("DescribeSecurityIps").param("DBInstanceId", id))
            .await?;
        let response: DescribeSecurityIpsResponse = serde_json::from_value(body)?;

        let ips: BTreeSet<String> = response
            .security_ip_groups
            .security_ip_group
            .iter()
            .filter(|group| group.security_ip_group_attribute != HIDDEN_GROUP)
            .flat_map(|group| group.security_ip_list.split(','))
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .collect();
        Ok(ips.into_iter().collect())
    }

    pub async fn modify_security_ips(&self, id: &str, ips: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("ModifySecurityIps")
                .param("DBInstanceId", id)
                .param("SecurityIps", ips),
        )
        .await?;
        self.wait_for_instance(id, RUNNING, retry::DEFAULT_TIMEOUT).await
    }

    /// Apply node changes one by one, waiting for the instance after each
    pub async fn modify_sharding_nodes(
        &self,
        id: &str,
        node_type: NodeType,
        current: &[ShardingNode],
        desired: &[ShardingNode],
    ) -> Result<()> {
        let changes = plan_node_changes(current, desired);
        if changes.is_empty() {
            return Ok(());
        }
        self.wait_for_instance(id, RUNNING, retry::DEFAULT_LONG_TIMEOUT)
            .await?;

        for change in changes {
            let request = match change {
                NodeChange::Create(node) => {
                    let request = RpcRequest::new("CreateNode")
                        .param("DBInstanceId", id)
                        .param("NodeType", node_type.as_str())
                        .param("NodeClass", &node.node_class)
                        .param("ClientToken", build_client_token("CreateNode"));
                    with_storage(request, node_type, &node)
                }
                NodeChange::Delete(node_id) => RpcRequest::new("DeleteNode")
                    .param("DBInstanceId", id)
                    .param("NodeId", node_id)
                    .param("ClientToken", build_client_token("DeleteNode")),
                NodeChange::Modify { node_id, node } => {
                    let request = RpcRequest::new("ModifyNodeSpec")
                        .param("DBInstanceId", id)
                        .param("NodeId", node_id)
                        .param("NodeClass", &node.node_class)
                        .param("ClientToken", build_client_token("ModifyNodeSpec"));
                    with_storage(request, node_type, &node)
                }
            };
            self.call(id, request).await?;
            self.wait_for_instance(id, RUNNING, retry::DEFAULT_LONG_TIMEOUT)
                .await?;
        }
        Ok(())
    }

    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        self.call(id, RpcRequest::new("DeleteDBInstance").param("DBInstanceId", id))
            .await
            .map(|_| ())
    }
}

fn with_storage(request: RpcRequest, node_type: NodeType, node: &ShardingNode) -> RpcRequest {
    match (node_type, node.node_storage) {
        (NodeType::Shard, Some(storage)) => request.param("NodeStorage", storage),
        _ => request,
    }
}

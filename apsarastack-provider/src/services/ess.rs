//! Auto Scaling (ess) API calls

use serde::Deserialize;

use super::number_or_string;
use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, SdkError, ServiceCode};

pub const PAGE_SIZE_LARGE: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ScalingGroup {
    pub scaling_group_id: String,
    pub scaling_group_name: String,
    #[serde(deserialize_with = "number_or_string")]
    pub min_size: i64,
    #[serde(deserialize_with = "number_or_string")]
    pub max_size: i64,
    #[serde(deserialize_with = "number_or_string")]
    pub default_cooldown: i64,
    pub lifecycle_state: String,
    pub removal_policies: RemovalPolicies,
    #[serde(rename = "VSwitchIds")]
    pub vswitch_ids: VSwitchIds,
    pub load_balancer_ids: LoadBalancerIds,
    #[serde(rename = "DBInstanceIds")]
    pub db_instance_ids: DbInstanceIds,
    #[serde(rename = "MultiAZPolicy")]
    pub multi_az_policy: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RemovalPolicies {
    pub removal_policy: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VSwitchIds {
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerIds {
    pub load_balancer_id: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DbInstanceIds {
    #[serde(rename = "DBInstanceId")]
    pub db_instance_id: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeScalingGroupsResponse {
    scaling_groups: ScalingGroups,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ScalingGroups {
    scaling_group: Vec<ScalingGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CreateScalingGroupResponse {
    scaling_group_id: String,
}

/// Which attachment API a set change goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    LoadBalancers,
    DbInstances,
}

impl Attachment {
    fn actions(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Attachment::LoadBalancers => ("AttachLoadBalancers", "DetachLoadBalancers", "LoadBalancer"),
            Attachment::DbInstances => ("AttachDBInstances", "DetachDBInstances", "DBInstance"),
        }
    }
}

pub struct EssService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> EssService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    async fn call(&self, id: &str, request: RpcRequest) -> Result<serde_json::Value> {
        let action = request.action.clone();
        let ess = self.client.service(ServiceCode::Ess).await?;
        ess.call(request).await.map_err(|e| e.context(id, action))
    }

    pub async fn create_scaling_group(&self, request: RpcRequest) -> Result<String> {
        let body = self.call("apsarastack_ess_scaling_group", request).await?;
        let response: CreateScalingGroupResponse = serde_json::from_value(body)?;
        if response.scaling_group_id.is_empty() {
            return Err(SdkError::Config(
                "CreateScalingGroup returned no ScalingGroupId".to_string(),
            ));
        }
        Ok(response.scaling_group_id)
    }

    pub async fn describe_scaling_group(&self, id: &str) -> Result<ScalingGroup> {
        let body = self
            .call(
                id,
                RpcRequest::new("DescribeScalingGroups").param("ScalingGroupId.1", id),
            )
            .await?;
        let response: DescribeScalingGroupsResponse = serde_json::from_value(body)?;
        response
            .scaling_groups
            .scaling_group
            .into_iter()
            .find(|group| group.scaling_group_id == id)
            .ok_or_else(|| SdkError::not_found("EssScalingGroup", id))
    }

    /// One page of scaling groups, numbered from 1
    pub async fn list_scaling_groups(&self, page: usize, page_size: usize) -> Result<Vec<ScalingGroup>> {
        let body = self
            .call(
                "scaling groups",
                RpcRequest::new("DescribeScalingGroups")
                    .param("PageNumber", page)
                    .param("PageSize", page_size),
            )
            .await?;
        let response: DescribeScalingGroupsResponse = serde_json::from_value(body)?;
        Ok(response.scaling_groups.scaling_group)
    }

    /// Every scaling group in the region
    pub async fn list_all_scaling_groups(&self) -> Result<Vec<ScalingGroup>> {
        let mut groups = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.list_scaling_groups(page, PAGE_SIZE_LARGE).await?;
            let len = batch.len();
            groups.extend(batch);
            if len < PAGE_SIZE_LARGE {
                break;
            }
            page += 1;
        }
        Ok(groups)
    }

    pub async fn modify_scaling_group(&self, request: RpcRequest) -> Result<()> {
        let id = request
            .params
            .get("ScalingGroupId")
            .cloned()
            .unwrap_or_default();
        self.call(&id, request).await.map(|_| ())
    }

    pub async fn attach(&self, id: &str, kind: Attachment, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let (attach, _, prefix) = kind.actions();
        self.call(
            id,
            RpcRequest::new(attach)
                .param("ScalingGroupId", id)
                .param("ForceAttach", true)
                .param_list(prefix, ids),
        )
        .await
        .map(|_| ())
    }

    pub async fn detach(&self, id: &str, kind: Attachment, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let (_, detach, prefix) = kind.actions();
        let mut request = RpcRequest::new(detach)
            .param("ScalingGroupId", id)
            .param_list(prefix, ids);
        if kind == Attachment::DbInstances {
            request = request.param("ForceDetach", true);
        }
        self.call(id, request).await.map(|_| ())
    }

    pub async fn delete_scaling_group(&self, id: &str) -> Result<()> {
        self.call(
            id,
            RpcRequest::new("DeleteScalingGroup")
                .param("ScalingGroupId", id)
                .param("ForceDelete", true),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, client_for};
    use serde_json::json;

    fn group(id: usize) -> serde_json::Value {
        json!({ "ScalingGroupId": format!("asg-{}", id), "ScalingGroupName": format!("group-{}", id) })
    }

    #[tokio::test]
    async fn pages_until_a_short_page() {
        let server = MockServer::start(|req| {
            let page: usize = req.param("PageNumber").unwrap_or("1").parse().unwrap();
            let count = if page == 1 { PAGE_SIZE_LARGE } else { 3 };
            let groups: Vec<_> = (0..count).map(|i| group(page * 100 + i)).collect();
            (200, json!({ "ScalingGroups": { "ScalingGroup": groups }, "TotalCount": 53 }))
        })
        .await;
        let client = client_for(&server);

        let groups = EssService::new(&client).list_all_scaling_groups().await.unwrap();
        assert_eq!(groups.len(), 53);
        assert_eq!(server.requests().len(), 2);
        assert_eq!(server.requests()[1].param("PageSize"), Some("50"));
    }

    #[tokio::test]
    async fn describe_decodes_nested_lists() {
        let server = MockServer::start(|_| {
            (
                200,
                json!({ "ScalingGroups": { "ScalingGroup": [{
                    "ScalingGroupId": "asg-1",
                    "ScalingGroupName": "tf-testAccEssScalingGroup-1",
                    "MinSize": 1,
                    "MaxSize": 4,
                    "DefaultCooldown": 20,
                    "RemovalPolicies": { "RemovalPolicy": ["OldestInstance", "NewestInstance"] },
                    "VSwitchIds": { "VSwitchId": ["vsw-1", "vsw-2"] },
                    "LoadBalancerIds": { "LoadBalancerId": ["lb-1"] },
                    "DBInstanceIds": { "DBInstanceId": [] },
                }]}}),
            )
        })
        .await;
        let client = client_for(&server);

        let group = EssService::new(&client)
            .describe_scaling_group("asg-1")
            .await
            .unwrap();
        assert_eq!(group.max_size, 4);
        assert_eq!(group.removal_policies.removal_policy.len(), 2);
        assert_eq!(group.vswitch_ids.vswitch_id, vec!["vsw-1", "vsw-2"]);
        assert_eq!(group.load_balancer_ids.load_balancer_id, vec!["lb-1"]);
        assert_eq!(server.requests()[0].param("ScalingGroupId.1"), Some("asg-1"));
    }

    #[tokio::test]
    async fn attach_and_detach_use_indexed_ids() {
        let server = MockServer::start(|_| (200, json!({ "RequestId": "r" }))).await;
        let client = client_for(&server);
        let ess = EssService::new(&client);

        ess.attach("asg-1", Attachment::LoadBalancers, &["lb-1".to_string(), "lb-2".to_string()])
            .await
            .unwrap();
        ess.detach("asg-1", Attachment::DbInstances, &["rm-1".to_string()])
            .await
            .unwrap();
        ess.attach("asg-1", Attachment::DbInstances, &[]).await.unwrap();

        assert_eq!(server.actions(), vec!["AttachLoadBalancers", "DetachDBInstances"]);
        let attach = &server.requests()[0];
        assert_eq!(attach.param("LoadBalancer.2"), Some("lb-2"));
        assert_eq!(attach.param("ForceAttach"), Some("true"));
        let detach = &server.requests()[1];
        assert_eq!(detach.param("DBInstance.1"), Some("rm-1"));
    }
}

//! VPC API calls

use serde::Deserialize;

use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, SdkError, ServiceCode};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VSwitch {
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: String,
    pub vpc_id: String,
    pub zone_id: String,
    pub cidr_block: String,
    pub status: String,
}

pub struct VpcService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> VpcService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    pub async fn describe_vswitch(&self, id: &str) -> Result<VSwitch> {
        let vpc = self.client.service(ServiceCode::Vpc).await?;
        let vsw: VSwitch = vpc
            .call_as(RpcRequest::new("DescribeVSwitchAttributes").param("VSwitchId", id))
            .await
            .map_err(|e| e.context(id, "DescribeVSwitchAttributes"))?;
        if vsw.vswitch_id != id {
            return Err(SdkError::not_found("VSwitch", id));
        }
        Ok(vsw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, client_for};
    use serde_json::json;

    #[tokio::test]
    async fn describes_vswitch() {
        let server = MockServer::start(|req| {
            if req.param("VSwitchId") == Some("vsw-1") {
                (
                    200,
                    json!({ "VSwitchId": "vsw-1", "VpcId": "vpc-1", "ZoneId": "cn-qingdao-b" }),
                )
            } else {
                (200, json!({ "RequestId": "r" }))
            }
        })
        .await;
        let client = client_for(&server);
        let vpc = VpcService::new(&client);

        let vsw = vpc.describe_vswitch("vsw-1").await.unwrap();
        assert_eq!(vsw.vpc_id, "vpc-1");
        assert_eq!(vsw.zone_id, "cn-qingdao-b");

        assert!(vpc.describe_vswitch("vsw-2").await.unwrap_err().is_not_found());
    }
}

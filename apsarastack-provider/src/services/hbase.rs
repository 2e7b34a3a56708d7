//! HBase API calls

use serde::Deserialize;

use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, ServiceCode};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MultimodeCmsUrl {
    pub request_id: String,
    pub cluster_id: String,
    /// Spelled this way by the API
    pub multimod_cms_url: String,
}

pub struct HbaseService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> HbaseService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    pub async fn get_multimode_cms_url(&self, cluster_id: &str) -> Result<MultimodeCmsUrl> {
        let hbase = self.client.service(ServiceCode::Hbase).await?;
        hbase
            .call_as(RpcRequest::new("GetMultimodeCmsUrl").param("ClusterId", cluster_id))
            .await
            .map_err(|e| e.context(cluster_id, "GetMultimodeCmsUrl"))
    }
}

//! apsarastack_hbase_multimode_cms_url

use apsarastack_core::provider::ProviderResult;
use apsarastack_core::resource::{Resource, State, Value};
use apsarastack_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::connectivity::ApsaraStackClient;
use crate::resources::{HBASE_MULTIMODE_CMS_URL, sdk_error};
use crate::services::HbaseService;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(HBASE_MULTIMODE_CMS_URL)
        .with_description("Monitoring console URL of an HBase multimode cluster")
        .as_data_source()
        .attribute(
            AttributeSchema::new("cluster_id", AttributeType::String)
                .required()
                .with_provider_name("ClusterId"),
        )
        .attribute(AttributeSchema::new("multimode_cms_url", AttributeType::String).read_only())
}

pub async fn read(client: &ApsaraStackClient, resource: &Resource) -> ProviderResult<State> {
    let cluster_id = resource.get_str("cluster_id");
    let url = HbaseService::new(client)
        .get_multimode_cms_url(cluster_id)
        .await
        .map_err(|e| sdk_error(&resource.id, e))?;

    let mut attributes = resource.attributes.clone();
    attributes.insert(
        "multimode_cms_url".to_string(),
        Value::from(url.multimod_cms_url),
    );
    Ok(State::existing(resource.id.clone(), attributes).with_identifier(cluster_id))
}

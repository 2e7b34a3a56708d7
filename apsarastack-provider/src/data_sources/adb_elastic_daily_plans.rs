//! apsarastack_adb_elastic_daily_plans

use apsarastack_core::provider::ProviderResult;
use apsarastack_core::resource::{Resource, State, Value};
use apsarastack_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::connectivity::ApsaraStackClient;
use crate::resources::{ADB_ELASTIC_DAILY_PLANS, sdk_error};
use crate::services::AdbService;
use crate::services::adb::ElasticDailyPlanQuery;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(ADB_ELASTIC_DAILY_PLANS)
        .with_description("Daily elastic plans of an AnalyticDB for MySQL cluster")
        .as_data_source()
        .attribute(AttributeSchema::new("db_cluster_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("elastic_plan_name", AttributeType::String))
        .attribute(AttributeSchema::new("elastic_daily_plan_day", AttributeType::String))
        .attribute(AttributeSchema::new(
            "status_list",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(AttributeSchema::new("resource_pool_name", AttributeType::String))
        .attribute(
            AttributeSchema::new(
                "plans",
                AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
            )
            .read_only(),
        )
}

fn optional(resource: &Resource, key: &str) -> Option<String> {
    Some(resource.get_str(key))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub async fn read(client: &ApsaraStackClient, resource: &Resource) -> ProviderResult<State> {
    let query = ElasticDailyPlanQuery {
        db_cluster_id: resource.get_str("db_cluster_id").to_string(),
        elastic_plan_name: optional(resource, "elastic_plan_name"),
        elastic_daily_plan_day: optional(resource, "elastic_daily_plan_day"),
        status_list: resource.get_strings("status_list"),
        resource_pool_name: optional(resource, "resource_pool_name"),
    };

    let plans = AdbService::new(client)
        .describe_elastic_daily_plans(&query)
        .await
        .map_err(|e| sdk_error(&resource.id, e))?;

    let mut attributes = resource.attributes.clone();
    attributes.insert(
        "plans".to_string(),
        Value::List(plans.iter().filter_map(Value::from_json).collect()),
    );
    Ok(State::existing(resource.id.clone(), attributes).with_identifier(query.db_cluster_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, client_for};
    use serde_json::json;

    #[tokio::test]
    async fn plans_are_returned_as_maps() {
        let server = MockServer::start(|_| {
            (
                200,
                json!({ "ElasticDailyPlanList": [
                    { "PlanName": "nightly", "Status": "running", "Day": "2024-01-01" },
                    { "PlanName": "weekly", "Status": "success", "Day": "2024-01-02" },
                ]}),
            )
        })
        .await;
        let client = client_for(&server);

        let resource = Resource::new(ADB_ELASTIC_DAILY_PLANS, "plans")
            .with_read_only(true)
            .with_attribute("db_cluster_id", Value::from("am-1"))
            .with_attribute("status_list", Value::string_list(["running", "success"]));
        let state = read(&client, &resource).await.unwrap();

        let sent = &server.requests()[0];
        assert_eq!(sent.action(), "DescribeElasticDailyPlan");
        assert_eq!(sent.param("DBClusterId"), Some("am-1"));
        assert_eq!(sent.param("ElasticDailyPlanStatusList"), Some("running,success"));
        assert_eq!(sent.param("ElasticPlanName"), None);

        let plans = state.attributes["plans"].as_list().unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(
            plans[0].as_map().unwrap()["PlanName"],
            Value::from("nightly")
        );
    }

    #[tokio::test]
    async fn no_plans_is_an_empty_list() {
        let server = MockServer::start(|_| (200, json!({ "RequestId": "r" }))).await;
        let client = client_for(&server);

        let resource = Resource::new(ADB_ELASTIC_DAILY_PLANS, "plans")
            .with_read_only(true)
            .with_attribute("db_cluster_id", Value::from("am-1"))
            .with_attribute("elastic_plan_name", Value::from("nightly"));
        let state = read(&client, &resource).await.unwrap();

        assert_eq!(server.requests()[0].param("ElasticPlanName"), Some("nightly"));
        assert_eq!(state.attributes["plans"], Value::List(vec![]));
    }
}

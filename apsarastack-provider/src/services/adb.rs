//! AnalyticDB for MySQL API calls

use serde::Deserialize;

use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, ServiceCode};

/// Filters for `DescribeElasticDailyPlan`; empty fields are not sent
#[derive(Debug, Clone, Default)]
pub struct ElasticDailyPlanQuery {
    pub db_cluster_id: String,
    pub elastic_plan_name: Option<String>,
    pub elastic_daily_plan_day: Option<String>,
    pub status_list: Vec<String>,
    pub resource_pool_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeElasticDailyPlanResponse {
    elastic_daily_plan_list: Vec<serde_json::Value>,
}

pub struct AdbService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> AdbService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    /// Plans as returned by the API, one JSON object each
    pub async fn describe_elastic_daily_plans(
        &self,
        query: &ElasticDailyPlanQuery,
    ) -> Result<Vec<serde_json::Value>> {
        let adb = self.client.service(ServiceCode::Adb).await?;
        let status_list = query.status_list.join(",");
        let request = RpcRequest::new("DescribeElasticDailyPlan")
            .param("DBClusterId", &query.db_cluster_id)
            .param_opt("ElasticPlanName", query.elastic_plan_name.as_deref())
            .param_opt("ElasticDailyPlanDay", query.elastic_daily_plan_day.as_deref())
            .param_opt("ElasticDailyPlanStatusList", Some(status_list))
            .param_opt("ResourcePoolName", query.resource_pool_name.as_deref());

        let response: DescribeElasticDailyPlanResponse = adb
            .call_as(request)
            .await
            .map_err(|e| e.context(&query.db_cluster_id, "DescribeElasticDailyPlan"))?;
        Ok(response.elastic_daily_plan_list)
    }
}

//! ApsaraStackClient - per-service client cache and caller identity
//!
//! One client is built per provider configuration. Service clients are
//! constructed on first use and shared afterwards; the endpoint of each is
//! resolved from explicit endpoints, the gateway domain, or the location
//! service.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::config::{Config, Protocol};
use super::error::{Result, SdkError};
use super::rpc::{Credentials, RpcRequest, Scope, ServiceClient};
use super::service_code::{EndpointPolicy, ServiceCode};

pub const PROVIDER_VERSION: &str = env!("CARGO_PKG_VERSION");

const TERRAFORM: &str = "HashiCorp-Terraform";
const PROVIDER: &str = "Terraform-Provider";
const MODULE: &str = "Terraform-Module";

const DEFAULT_LOCATION_ENDPOINT: &str = "location-readonly.aliyuncs.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Strip a leading `http://` or `https://`
pub fn strip_scheme(endpoint: &str) -> &str {
    endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint)
}

#[derive(Debug, Deserialize)]
struct DescribeEndpointsResponse {
    #[serde(rename = "Endpoints", default)]
    endpoints: LocationEndpoints,
}

#[derive(Debug, Default, Deserialize)]
struct LocationEndpoints {
    #[serde(rename = "Endpoint", default)]
    endpoint: Vec<LocationEndpoint>,
}

#[derive(Debug, Deserialize)]
struct LocationEndpoint {
    #[serde(rename = "Endpoint", default)]
    endpoint: String,
    #[serde(rename = "Type", default)]
    endpoint_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct NavigationInfo {
    #[serde(default)]
    data: NavigationData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationData {
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default)]
    default_role: Option<DefaultRole>,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultRole {
    #[serde(default)]
    id: Option<i64>,
}

/// Unsigned request template for an arbitrary product
#[derive(Debug, Clone)]
pub struct CommonRequest {
    pub product: String,
    pub service_code: String,
    pub endpoint: String,
    pub version: String,
    pub region_id: String,
    pub protocol: Protocol,
    pub query_params: BTreeMap<String, String>,
}

pub struct ApsaraStackClient {
    config: Config,
    pub region_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub department: String,
    pub resource_group: String,
    pub domain: Option<String>,
    services: Mutex<HashMap<ServiceCode, Arc<ServiceClient>>>,
    /// Location service answers, keyed by location code
    discovered: Mutex<HashMap<String, String>>,
    account_id: Mutex<Option<String>>,
    role_id: Mutex<Option<i64>>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ApsaraStackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApsaraStackClient")
            .field("region_id", &self.region_id)
            .field("department", &self.department)
            .field("resource_group", &self.resource_group)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl ApsaraStackClient {
    pub fn new(config: Config) -> Result<Self> {
        config.load_and_validate()?;
        Ok(Self {
            region_id: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            department: config.department.clone(),
            resource_group: config.resource_group.clone(),
            domain: config.domain.clone().filter(|d| !d.is_empty()),
            config,
            services: Mutex::new(HashMap::new()),
            discovered: Mutex::new(HashMap::new()),
            account_id: Mutex::new(None),
            role_id: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Interval between status polls while waiting on long operations
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cached client for a product, constructed on first use
    pub async fn service(&self, code: ServiceCode) -> Result<Arc<ServiceClient>> {
        let mut services = self.services.lock().await;
        if let Some(client) = services.get(&code) {
            return Ok(client.clone());
        }

        let endpoint = self.resolve_endpoint(code).await?;
        debug!("initializing the {} client with endpoint {}", code, endpoint);
        let client = Arc::new(self.build_service_client(code, &endpoint)?);
        services.insert(code, client.clone());
        Ok(client)
    }

    async fn resolve_endpoint(&self, code: ServiceCode) -> Result<String> {
        if let Some(endpoint) = self.config.endpoint_for(code.product()) {
            return Ok(strip_scheme(endpoint).to_string());
        }
        if code == ServiceCode::Location {
            return Ok(strip_scheme(self.location_endpoint()).to_string());
        }
        if let Some(domain) = &self.domain {
            return Ok(strip_scheme(domain).to_string());
        }
        if let Some(endpoint) = self.discovered.lock().await.get(code.location_code()) {
            return Ok(endpoint.clone());
        }

        let endpoint = match code.policy() {
            EndpointPolicy::Required => {
                return Err(SdkError::MissingEndpoint {
                    service: code.product().to_string(),
                });
            }
            EndpointPolicy::Discover => self.describe_endpoint(code.location_code()).await?,
            EndpointPolicy::Fallback(template) => {
                match self.describe_endpoint(code.location_code()).await {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        let endpoint = template.replace("{region}", &self.region_id);
                        error!(
                            "loading {} endpoint got an error: {}. Using the endpoint {} instead.",
                            code, e, endpoint
                        );
                        endpoint
                    }
                }
            }
        };

        let endpoint = strip_scheme(&endpoint).to_string();
        self.discovered
            .lock()
            .await
            .insert(code.location_code().to_string(), endpoint.clone());
        Ok(endpoint)
    }

    fn location_endpoint(&self) -> &str {
        self.config
            .location_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_LOCATION_ENDPOINT)
    }

    /// Ask the location service for the openAPI endpoint of a service code
    pub async fn describe_endpoint(&self, location_code: &str) -> Result<String> {
        let location =
            self.build_service_client(ServiceCode::Location, strip_scheme(self.location_endpoint()))?;

        let response: DescribeEndpointsResponse = location
            .call_as(
                RpcRequest::new("DescribeEndpoints")
                    .param("ServiceCode", location_code)
                    .param("Id", &self.region_id)
                    .param("Type", "openAPI"),
            )
            .await
            .map_err(|e| {
                SdkError::Config(format!(
                    "Describe {} endpoint using region: {} got an error: {}.",
                    location_code, self.region_id, e
                ))
            })?;

        response
            .endpoints
            .endpoint
            .into_iter()
            .find(|e| e.endpoint_type == "openAPI" && !e.endpoint.is_empty())
            .map(|e| e.endpoint)
            .ok_or_else(|| SdkError::NoEndpoint {
                service: location_code.to_string(),
                region: self.region_id.clone(),
            })
    }

    fn build_service_client(&self, code: ServiceCode, endpoint: &str) -> Result<ServiceClient> {
        let http = self.http_client(code.timeout(), endpoint)?;
        Ok(ServiceClient::new(
            http,
            code.product(),
            code.api_version(),
            endpoint,
            self.config.protocol,
            self.credentials(),
            self.scope(),
        ))
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            security_token: self.config.security_token.clone(),
        }
    }

    fn scope(&self) -> Scope {
        Scope {
            region_id: self.region_id.clone(),
            department: self.department.clone(),
            resource_group: self.resource_group.clone(),
        }
    }

    fn http_client(&self, timeout: Duration, endpoint: &str) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent())
            .timeout(timeout)
            .connect_timeout(self.config.tls_handshake_timeout)
            .danger_accept_invalid_certs(self.config.insecure)
            .no_proxy();

        if let Some(proxy) = self.proxy_for(endpoint)? {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| SdkError::Config(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| SdkError::Config(format!("unable to build the HTTP client: {}", e)))
    }

    /// Explicit proxy first, then the protocol's environment proxy unless
    /// the endpoint matches `NO_PROXY`
    pub fn proxy_for(&self, endpoint: &str) -> Result<Option<String>> {
        if let Some(proxy) = self.config.proxy.as_ref().filter(|p| !p.is_empty()) {
            return Ok(Some(proxy.clone()));
        }
        match &self.config.env_proxy {
            Some(proxy) if !self.skip_proxy(endpoint)? => Ok(Some(proxy.clone())),
            _ => Ok(None),
        }
    }

    fn skip_proxy(&self, endpoint: &str) -> Result<bool> {
        for entry in &self.config.no_proxy {
            let pattern = if entry.starts_with('*') {
                format!(".{}", entry)
            } else {
                entry.clone()
            };
            let re = Regex::new(&pattern)
                .map_err(|e| SdkError::Config(format!("invalid NO_PROXY entry {}: {}", entry, e)))?;
            if re.is_match(endpoint) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn user_agent(&self) -> String {
        let mut parts = Vec::new();
        if let Some(tf) = self.config.terraform_version.as_deref().filter(|v| !v.is_empty()) {
            parts.push(format!("{}/{}", TERRAFORM, tf.trim_end_matches("-dev")));
        }
        parts.push(format!("{}/{}", PROVIDER, PROVIDER_VERSION));
        parts.push(format!("{}/{}", MODULE, self.config.configuration_source));
        parts.join(" ")
    }

    async fn caller_info(&self) -> Result<NavigationInfo> {
        if self.config.endpoint_for("ascm").is_none() && self.domain.is_none() {
            return Err(SdkError::MissingEndpoint {
                service: "ascm".to_string(),
            });
        }
        if self.department.is_empty() || self.resource_group.is_empty() {
            return Err(SdkError::Config(
                "unable to initialize the ascm client: department or resource_group is not provided"
                    .to_string(),
            ));
        }

        let ascm = self.service(ServiceCode::Ascm).await?;
        ascm.call_as(RpcRequest::get("GetAllNavigationInfo")).await
    }

    /// Account id of the caller, fetched once
    pub async fn account_id(&self) -> Result<String> {
        let mut account_id = self.account_id.lock().await;
        if let Some(id) = account_id.as_ref() {
            return Ok(id.clone());
        }

        debug!("account_id not provided, attempting to retrieve it automatically...");
        let identity = self
            .caller_info()
            .await?
            .data
            .primary_key
            .ok_or_else(|| SdkError::Config("ownerId not found".to_string()))?;
        if identity.is_empty() {
            return Err(SdkError::Config(
                "caller identity doesn't contain any AccountId".to_string(),
            ));
        }
        *account_id = Some(identity.clone());
        Ok(identity)
    }

    /// Default role id of the caller, fetched once
    pub async fn role_id(&self) -> Result<i64> {
        let mut role_id = self.role_id.lock().await;
        if let Some(id) = *role_id {
            return Ok(id);
        }

        debug!("role_ids not provided, attempting to retrieve it automatically...");
        let id = self
            .caller_info()
            .await?
            .data
            .default_role
            .and_then(|role| role.id)
            .ok_or_else(|| SdkError::Config("default roleId not found".to_string()))?;
        if id == 0 {
            return Err(SdkError::Config(
                "caller identity doesn't contain default RoleId".to_string(),
            ));
        }
        *role_id = Some(id);
        Ok(id)
    }

    /// Request template for products without a catalogue entry
    pub async fn common_request(
        &self,
        product: &str,
        service_code: &str,
        api_version: &str,
    ) -> Result<CommonRequest> {
        let upper = product.to_uppercase();
        let configured = match upper.as_str() {
            "SLB" | "ECS" | "ASCM" => self.config.endpoint_for(&product.to_lowercase()),
            _ => None,
        };

        let endpoint = match configured {
            Some(endpoint) => endpoint.to_string(),
            None => match self.describe_endpoint(service_code).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    debug!("describe endpoint for {} failed: {}", service_code, e);
                    format!(
                        "{}.{}.aliyuncs.com",
                        service_code.to_lowercase(),
                        self.region_id
                    )
                }
            },
        };

        let mut query_params = BTreeMap::new();
        if matches!(upper.as_str(), "SLB" | "ECS" | "ASCM") {
            query_params.insert("AccessKeySecret".to_string(), self.secret_key.clone());
            query_params.insert("Product".to_string(), product.to_lowercase());
            query_params.insert("Department".to_string(), self.department.clone());
            query_params.insert("ResourceGroup".to_string(), self.resource_group.clone());
            query_params.insert("Version".to_string(), api_version.to_string());
        }

        Ok(CommonRequest {
            product: product.to_string(),
            service_code: service_code.to_string(),
            endpoint: strip_scheme(&endpoint).to_string(),
            version: api_version.to_string(),
            region_id: self.region_id.clone(),
            protocol: self.config.protocol,
            query_params,
        })
    }

    /// Sign and send a common request
    pub async fn process_common_request(
        &self,
        request: &CommonRequest,
        action: RpcRequest,
    ) -> Result<serde_json::Value> {
        let http = self.http_client(Duration::from_secs(30), &request.endpoint)?;
        let client = ServiceClient::new(
            http,
            request.product.to_lowercase(),
            request.version.clone(),
            request.endpoint.clone(),
            request.protocol,
            self.credentials(),
            self.scope(),
        );
        let mut action = action;
        for (k, v) in &request.query_params {
            action.params.entry(k.clone()).or_insert_with(|| v.clone());
        }
        client.call(action).await
    }
}

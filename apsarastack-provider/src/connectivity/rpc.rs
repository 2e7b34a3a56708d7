//! Signed RPC calls against a single product endpoint

use std::collections::BTreeMap;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::config::Protocol;
use super::error::{Result, SdkError};
use super::signer;

/// Retries for transport failures, throttling and server errors
pub const DEFAULT_CLIENT_RETRY_COUNT_SMALL: u32 = 5;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Parameters never written to the debug log
const MASKED_PARAMS: &[&str] = &["AccessKeySecret", "AccountPassword", "Signature", "SecurityToken"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One API action with its business parameters
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub action: String,
    pub method: Method,
    pub params: BTreeMap<String, String>,
}

impl RpcRequest {
    /// POST request; the signed parameters travel as a form body
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            method: Method::Post,
            params: BTreeMap::new(),
        }
    }

    pub fn get(action: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            ..Self::new(action)
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Set the parameter only when the value is present and non-empty
    pub fn param_opt<S: AsRef<str>>(mut self, key: impl Into<String>, value: Option<S>) -> Self {
        if let Some(v) = value
            && !v.as_ref().is_empty()
        {
            self.params.insert(key.into(), v.as_ref().to_string());
        }
        self
    }

    /// `Prefix.1`, `Prefix.2`, ... for each item
    pub fn param_list<S: AsRef<str>>(mut self, prefix: &str, items: &[S]) -> Self {
        for (i, item) in items.iter().enumerate() {
            self.params
                .insert(format!("{}.{}", prefix, i + 1), item.as_ref().to_string());
        }
        self
    }
}

/// Access key pair and optional STS token
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
}

/// Organisation scoping sent with every ApsaraStack request
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub region_id: String,
    pub department: String,
    pub resource_group: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: String,
}

/// Client bound to one product endpoint
#[derive(Debug)]
pub struct ServiceClient {
    http: reqwest::Client,
    product: String,
    version: String,
    endpoint: String,
    protocol: Protocol,
    credentials: Credentials,
    scope: Scope,
}

impl ServiceClient {
    pub fn new(
        http: reqwest::Client,
        product: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
        protocol: Protocol,
        credentials: Credentials,
        scope: Scope,
    ) -> Self {
        Self {
            http,
            product: product.into(),
            version: version.into(),
            endpoint: endpoint.into(),
            protocol,
            credentials,
            scope,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Common, ApsaraStack and business parameters for one attempt
    fn build_params(&self, request: &RpcRequest) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut set = |k: &str, v: &str| {
            params.insert(k.to_string(), v.to_string());
        };
        set("Format", "JSON");
        set("Version", &self.version);
        set("AccessKeyId", &self.credentials.access_key);
        set("SignatureMethod", signer::SIGNATURE_METHOD);
        set("SignatureVersion", signer::SIGNATURE_VERSION);
        set("SignatureNonce", &uuid::Uuid::new_v4().to_string());
        set("Timestamp", &signer::timestamp(chrono::Utc::now()));
        set("Action", &request.action);
        set("RegionId", &self.scope.region_id);
        if let Some(token) = &self.credentials.security_token {
            set("SecurityToken", token);
        }
        set("AccessKeySecret", &self.credentials.secret_key);
        set("Product", &self.product.to_lowercase());
        set("Department", &self.scope.department);
        set("ResourceGroup", &self.scope.resource_group);

        for (k, v) in &request.params {
            params.insert(k.clone(), v.clone());
        }
        params
    }

    fn loggable(params: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
        params
            .iter()
            .map(|(k, v)| {
                if MASKED_PARAMS.contains(&k.as_str()) {
                    (k.as_str(), "******")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect()
    }

    async fn send_once(&self, request: &RpcRequest) -> Result<serde_json::Value> {
        let mut params = self.build_params(request);
        let method = request.method.as_str();
        let signed = signer::sign_params(method, &mut params, &self.credentials.secret_key);

        debug!(
            "[{}] {} {} {:?}",
            self.product,
            request.action,
            self.endpoint,
            Self::loggable(&params)
        );

        let base = format!("{}://{}/", self.protocol.scheme(), self.endpoint);
        let builder = match request.method {
            Method::Get => self.http.get(format!("{}?{}", base, signed)),
            Method::Post => self
                .http
                .post(base)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(signed),
        };

        let response = builder
            .header("RegionId", &self.scope.region_id)
            .header("x-acs-regionid", &self.scope.region_id)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("[{}] {} response {}: {}", self.product, request.action, status, body);

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        let err = serde_json::from_str::<ApiErrorBody>(&body).unwrap_or(ApiErrorBody {
            code: status.as_str().to_string(),
            message: body.clone(),
            request_id: String::new(),
        });
        Err(SdkError::Api {
            code: err.code,
            message: err.message,
            request_id: err.request_id,
            status: status.as_u16(),
        })
    }

    /// Send the request, repeating it on transport errors, throttling and 5xx
    pub async fn call(&self, request: RpcRequest) -> Result<serde_json::Value> {
        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_throttling_or_server() && attempt < DEFAULT_CLIENT_RETRY_COUNT_SMALL => {
                    attempt += 1;
                    debug!(
                        "[{}] {} attempt {} failed, retrying: {}",
                        self.product, request.action, attempt, e
                    );
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send the request and decode the response body
    pub async fn call_as<T: DeserializeOwned>(&self, request: RpcRequest) -> Result<T> {
        let body = self.call(request).await?;
        Ok(serde_json::from_value(body)?)
    }
}

//! Provider configuration
//!
//! Values come from the manifest's `provider` block first, then from
//! `APSARASTACK_*` environment variables, then from defaults.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::error::{Result, SdkError};

const DEFAULT_TLS_HANDSHAKE_TIMEOUT: u64 = 120;

/// Request scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "HTTP" => Ok(Protocol::Http),
            "HTTPS" => Ok(Protocol::Https),
            other => Err(SdkError::Config(format!(
                "protocol must be HTTP or HTTPS, got {}",
                other
            ))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// The `provider` block as written in the manifest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    #[serde(alias = "region_id")]
    pub region: Option<String>,
    pub protocol: Option<String>,
    pub insecure: Option<bool>,
    pub proxy: Option<String>,
    pub domain: Option<String>,
    pub department: Option<String>,
    pub resource_group: Option<String>,
    pub location_endpoint: Option<String>,
    pub endpoints: HashMap<String, String>,
    pub configuration_source: Option<String>,
    pub terraform_version: Option<String>,
    pub skip_region_validation: Option<bool>,
}

/// Resolved provider configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
    pub region: String,
    pub protocol: Protocol,
    pub insecure: bool,
    /// Explicit proxy for both HTTP and HTTPS
    pub proxy: Option<String>,
    /// Proxy taken from `HTTP(S)_PROXY` for the configured protocol
    pub env_proxy: Option<String>,
    /// `NO_PROXY` entries, as regular expressions
    pub no_proxy: Vec<String>,
    pub domain: Option<String>,
    pub department: String,
    pub resource_group: String,
    pub location_endpoint: Option<String>,
    /// Product code -> endpoint
    pub endpoints: HashMap<String, String>,
    pub configuration_source: String,
    pub terraform_version: Option<String>,
    pub skip_region_validation: bool,
    pub tls_handshake_timeout: Duration,
}

impl Config {
    /// Layer the manifest settings over the process environment
    pub fn from_settings(settings: ProviderSettings) -> Result<Self> {
        Self::load(settings, |key| std::env::var(key).ok())
    }

    /// Layer the manifest settings over an arbitrary variable lookup
    pub fn load<F>(settings: ProviderSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.is_empty());
        let pick = |explicit: Option<String>, key: &str| {
            explicit.filter(|v| !v.is_empty()).or_else(|| var(key))
        };
        let flag = |explicit: Option<bool>, key: &str| {
            explicit.unwrap_or_else(|| {
                var(key).is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1"))
            })
        };

        let protocol = match pick(settings.protocol, "APSARASTACK_PROTOCOL") {
            Some(p) => Protocol::parse(&p)?,
            None => Protocol::default(),
        };

        let env_proxy = match protocol {
            Protocol::Https => var("HTTPS_PROXY").or_else(|| var("https_proxy")),
            Protocol::Http => var("HTTP_PROXY").or_else(|| var("http_proxy")),
        };
        let no_proxy = var("NO_PROXY")
            .or_else(|| var("no_proxy"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tls_handshake_timeout = var("TLSHandshakeTimeout")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TLS_HANDSHAKE_TIMEOUT);

        Ok(Self {
            access_key: pick(settings.access_key, "APSARASTACK_ACCESS_KEY").unwrap_or_default(),
            secret_key: pick(settings.secret_key, "APSARASTACK_SECRET_KEY").unwrap_or_default(),
            security_token: pick(settings.security_token, "APSARASTACK_SECURITY_TOKEN"),
            region: pick(settings.region, "APSARASTACK_REGION").unwrap_or_default(),
            protocol,
            insecure: flag(settings.insecure, "APSARASTACK_INSECURE"),
            proxy: pick(settings.proxy, "APSARASTACK_PROXY"),
            env_proxy,
            no_proxy,
            domain: pick(settings.domain, "APSARASTACK_DOMAIN"),
            department: pick(settings.department, "APSARASTACK_DEPARTMENT").unwrap_or_default(),
            resource_group: pick(settings.resource_group, "APSARASTACK_RESOURCE_GROUP")
                .unwrap_or_default(),
            location_endpoint: pick(settings.location_endpoint, "APSARASTACK_LOCATION_ENDPOINT"),
            endpoints: settings
                .endpoints
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .collect(),
            configuration_source: settings.configuration_source.unwrap_or_default(),
            terraform_version: settings.terraform_version,
            skip_region_validation: flag(
                settings.skip_region_validation,
                "APSARASTACK_SKIP_REGION_VALIDATION",
            ),
            tls_handshake_timeout: Duration::from_secs(tls_handshake_timeout),
        })
    }

    /// Reject configurations no request could be signed with
    pub fn load_and_validate(&self) -> Result<()> {
        if self.access_key.is_empty() {
            return Err(SdkError::Config(
                "access_key is required, set it in the provider block or APSARASTACK_ACCESS_KEY"
                    .to_string(),
            ));
        }
        if self.secret_key.is_empty() {
            return Err(SdkError::Config(
                "secret_key is required, set it in the provider block or APSARASTACK_SECRET_KEY"
                    .to_string(),
            ));
        }
        if self.region.is_empty() && !self.skip_region_validation {
            return Err(SdkError::Config(
                "region is required, set it in the provider block or APSARASTACK_REGION"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Explicit endpoint for a product code
    pub fn endpoint_for(&self, product: &str) -> Option<&str> {
        self.endpoints
            .get(product)
            .map(String::as_str)
            .filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn manifest_values_win_over_environment() {
        let settings = ProviderSettings {
            access_key: Some("manifest-key".to_string()),
            region: Some("cn-qingdao-env66-d01".to_string()),
            ..Default::default()
        };
        let config = Config::load(
            settings,
            env(&[
                ("APSARASTACK_ACCESS_KEY", "env-key"),
                ("APSARASTACK_SECRET_KEY", "env-secret"),
                ("APSARASTACK_DEPARTMENT", "11"),
            ]),
        )
        .unwrap();

        assert_eq!(config.access_key, "manifest-key");
        assert_eq!(config.secret_key, "env-secret");
        assert_eq!(config.department, "11");
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.tls_handshake_timeout, Duration::from_secs(120));
        assert!(config.load_and_validate().is_ok());
    }

    #[test]
    fn invalid_protocol_is_rejected() {
        let settings = ProviderSettings {
            protocol: Some("FTP".to_string()),
            ..Default::default()
        };
        assert!(Config::load(settings, env(&[])).is_err());
    }

    #[test]
    fn proxy_follows_protocol() {
        let vars = [
            ("HTTPS_PROXY", "http://secure-proxy:3128"),
            ("http_proxy", "http://plain-proxy:3128"),
            ("NO_PROXY", "*.internal, localhost"),
            ("TLSHandshakeTimeout", "30"),
        ];

        let https = Config::load(ProviderSettings::default(), env(&vars)).unwrap();
        assert_eq!(https.env_proxy.as_deref(), Some("http://secure-proxy:3128"));
        assert_eq!(https.no_proxy, vec!["*.internal", "localhost"]);
        assert_eq!(https.tls_handshake_timeout, Duration::from_secs(30));

        let settings = ProviderSettings {
            protocol: Some("http".to_string()),
            ..Default::default()
        };
        let http = Config::load(settings, env(&vars)).unwrap();
        assert_eq!(http.env_proxy.as_deref(), Some("http://plain-proxy:3128"));
    }

    #[test]
    fn validation_requires_credentials_and_region() {
        let config = Config::load(
            ProviderSettings::default(),
            env(&[("APSARASTACK_ACCESS_KEY", "ak")]),
        )
        .unwrap();
        assert!(config.load_and_validate().is_err());

        let config = Config::load(
            ProviderSettings {
                skip_region_validation: Some(true),
                ..Default::default()
            },
            env(&[
                ("APSARASTACK_ACCESS_KEY", "ak"),
                ("APSARASTACK_SECRET_KEY", "sk"),
            ]),
        )
        .unwrap();
        assert!(config.load_and_validate().is_ok());
    }

    #[test]
    fn settings_parse_from_manifest_json() {
        let settings: ProviderSettings = serde_json::from_value(serde_json::json!({
            "access_key": "ak",
            "region_id": "cn-qingdao",
            "endpoints": { "dds": "dds.example.com", "ess": "" },
        }))
        .unwrap();
        let config = Config::load(settings, env(&[])).unwrap();

        assert_eq!(config.region, "cn-qingdao");
        assert_eq!(config.endpoint_for("dds"), Some("dds.example.com"));
        assert_eq!(config.endpoint_for("ess"), None);
    }
}

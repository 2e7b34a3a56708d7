//! Errors raised while talking to ApsaraStack APIs

use thiserror::Error;

/// Error codes that mean the addressed resource no longer exists
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidDBInstanceId.NotFound",
    "InvalidScalingGroupId.NotFound",
    "InvalidVSwitchId.NotFound",
    "Forbidden.InstanceNotFound",
    "ClusterNotFound",
];

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{code}: {message} (RequestId: {request_id}, HTTP {status})")]
    Api {
        code: String,
        message: String,
        request_id: String,
        status: u16,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unable to initialize the {service} client: endpoint or domain is not provided for {service} service")]
    MissingEndpoint { service: String },

    #[error("There is no any available endpoint for {service} in region {region}.")]
    NoEndpoint { service: String, region: String },

    #[error("{0}")]
    Config(String),

    #[error("{resource} {id} is not found")]
    NotFound { resource: String, id: String },

    #[error("{id} {action} failed: {source}")]
    Context {
        id: String,
        action: String,
        #[source]
        source: Box<SdkError>,
    },

    #[error("timeout while waiting: {0}")]
    Timeout(Box<SdkError>),

    #[error("timeout while waiting for {id} to become {target}, last status {last}")]
    WaitTimeout {
        id: String,
        target: String,
        last: String,
    },
}

pub type Result<T> = std::result::Result<T, SdkError>;

impl SdkError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        SdkError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Wrap with "{id} {action} failed" context
    pub fn context(self, id: impl Into<String>, action: impl Into<String>) -> Self {
        SdkError::Context {
            id: id.into(),
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past context and timeout wrappers
    pub fn root(&self) -> &SdkError {
        match self {
            SdkError::Context { source, .. } => source.root(),
            SdkError::Timeout(inner) => inner.root(),
            other => other,
        }
    }

    /// API error code, if the error came back from the service
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            SdkError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self.root() {
            SdkError::NotFound { .. } => true,
            SdkError::Api { code, .. } => {
                code.ends_with("NotFound")
                    || code.contains(".NotFound")
                    || NOT_FOUND_CODES.contains(&code.as_str())
            }
            _ => false,
        }
    }

    /// Whether the API error code is one of `codes`
    pub fn is_expected(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|code| codes.contains(&code))
    }

    /// Errors worth repeating the same request for
    pub fn is_throttling_or_server(&self) -> bool {
        match self.root() {
            SdkError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SdkError::Api { code, status, .. } => {
                code.starts_with("Throttling") || code == "ServiceUnavailable" || *status >= 500
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: &str, status: u16) -> SdkError {
        SdkError::Api {
            code: code.to_string(),
            message: "message".to_string(),
            request_id: "req-1".to_string(),
            status,
        }
    }

    #[test]
    fn not_found_detection() {
        assert!(api("InvalidDBInstanceId.NotFound", 404).is_not_found());
        assert!(api("InvalidScalingGroupId.NotFound", 404).is_not_found());
        assert!(api("ClusterNotFound", 400).is_not_found());
        assert!(SdkError::not_found("MongoDB", "dds-1").is_not_found());
        assert!(!api("Forbidden.RAM", 403).is_not_found());
    }

    #[test]
    fn not_found_survives_context() {
        let err = api("InvalidDBInstanceId.NotFound", 404).context("dds-1", "DeleteDBInstance");
        assert!(err.is_not_found());
        assert!(err.is_expected(&["InvalidDBInstanceId.NotFound"]));
        assert_eq!(
            err.to_string(),
            "dds-1 DeleteDBInstance failed: InvalidDBInstanceId.NotFound: message (RequestId: req-1, HTTP 404)"
        );
    }

    #[test]
    fn throttling_and_server_errors_are_retried() {
        assert!(api("Throttling.User", 400).is_throttling_or_server());
        assert!(api("InternalError", 500).is_throttling_or_server());
        assert!(!api("InvalidParameter", 400).is_throttling_or_server());
    }

    #[test]
    fn missing_endpoint_message() {
        let err = SdkError::MissingEndpoint {
            service: "dds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unable to initialize the dds client: endpoint or domain is not provided for dds service"
        );
    }
}

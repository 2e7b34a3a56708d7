//! Connectivity layer: configuration, signing, endpoints and the shared client

mod client;
mod config;
mod error;
mod rpc;
mod service_code;
pub mod signer;

pub use client::{ApsaraStackClient, CommonRequest, PROVIDER_VERSION, strip_scheme};
pub use config::{Config, Protocol, ProviderSettings};
pub use error::{Result, SdkError};
pub use rpc::{Credentials, DEFAULT_CLIENT_RETRY_COUNT_SMALL, Method, RpcRequest, Scope, ServiceClient};
pub use service_code::{EndpointPolicy, ServiceCode};

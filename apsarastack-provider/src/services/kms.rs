//! KMS decryption of encrypted passwords

use std::collections::HashMap;

use serde::Deserialize;

use crate::connectivity::{ApsaraStackClient, Result, RpcRequest, ServiceCode};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DecryptResponse {
    pub plaintext: String,
    pub key_id: String,
}

pub struct KmsService<'a> {
    client: &'a ApsaraStackClient,
}

impl<'a> KmsService<'a> {
    pub fn new(client: &'a ApsaraStackClient) -> Self {
        Self { client }
    }

    /// Decrypt a ciphertext blob; the context is sent as a JSON object
    pub async fn decrypt(
        &self,
        ciphertext: &str,
        context: &HashMap<String, String>,
    ) -> Result<DecryptResponse> {
        let kms = self.client.service(ServiceCode::Kms).await?;
        let mut request = RpcRequest::new("Decrypt").param("CiphertextBlob", ciphertext);
        if !context.is_empty() {
            request = request.param("EncryptionContext", serde_json::to_string(context)?);
        }
        kms.call_as(request)
            .await
            .map_err(|e| e.context("kms", "Decrypt"))
    }
}

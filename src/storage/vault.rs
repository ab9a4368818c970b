/// HashiCorp Vault storage backend (KV version 2 over HTTP).
///
/// Records land under `v1/secret/data/<prefix><name>` with the record data
/// and metadata as fields of the secret payload; listing goes through the
/// metadata endpoint.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::StorageBackend;
use crate::error::{Result, SignerError};

const MOUNT: &str = "secret";

pub struct VaultBackend {
    client: Client,
    address: String,
    token: String,
    prefix: String,
}

impl VaultBackend {
    pub fn new(address: &str, token: &str, prefix: &str) -> Self {
        Self {
            client: Client::new(),
            address: address.trim_end_matches('/').to_string(),
            token: token.to_string(),
            prefix: prefix.to_string(),
        }
    }

    fn data_url(&self, name: &str) -> String {
        format!("{}/v1/{MOUNT}/data/{}{}", self.address, self.prefix, name)
    }

    fn metadata_url(&self, name: &str) -> String {
        format!("{}/v1/{MOUNT}/metadata/{}{}", self.address, self.prefix, name)
    }

    async fn get_secret(&self, name: &str) -> Result<Value> {
        let resp = self
            .client
            .get(self.data_url(name))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(io_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SignerError::NotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(io_error(body));
        }
        resp.json::<Value>().await.map_err(io_error)
    }
}

#[async_trait]
impl StorageBackend for VaultBackend {
    fn name(&self) -> &str {
        "vault"
    }

    fn path(&self) -> String {
        format!("{MOUNT}/{}*", self.prefix)
    }

    async fn save(&self, name: &str, data: &str) -> Result<()> {
        self.save_with_metadata(name, data, "").await
    }

    async fn save_with_metadata(&self, name: &str, data: &str, metadata: &str) -> Result<()> {
        debug!(name, "Saving key record to vault");
        let body = json!({ "data": { "data": data, "metadata": metadata } });
        let resp = self
            .client
            .post(self.data_url(name))
            .header("X-Vault-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(io_error)?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(io_error(body));
        }
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<(String, String)> {
        let secret = self.get_secret(name).await?;
        let fields = &secret["data"]["data"];
        let data = fields["data"].as_str().unwrap_or_default().to_string();
        let metadata = fields["metadata"].as_str().unwrap_or_default().to_string();
        Ok((data, metadata))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        // Vault deletes are soft by default; a missing record must still
        // surface as NotFound.
        self.get_secret(name).await?;

        let resp = self
            .client
            .delete(self.metadata_url(name))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(io_error)?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(io_error(body));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/v1/{MOUNT}/metadata?list=true", self.address))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(io_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(io_error(body));
        }

        let body: Value = resp.json().await.map_err(io_error)?;
        let keys = body["data"]["keys"]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str())
                    .filter(|k| k.len() > self.prefix.len() && k.starts_with(&self.prefix))
                    .map(|k| k[self.prefix.len()..].to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }
}

fn io_error(e: impl ToString) -> SignerError {
    SignerError::Io(std::io::Error::other(e.to_string()))
}

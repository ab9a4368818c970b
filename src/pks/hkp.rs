/// HKP keyserver client. Only `get` and `add` exist in the protocol subset
/// this service speaks; searches belong to the internal store.
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::{Result, SignerError};

const HKP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_IDLE_CONNECTIONS: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HkpClient {
    client: Client,
    base_url: String,
}

impl HkpClient {
    pub fn new(server: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HKP_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(|e| SignerError::ConfigurationInvalid(format!("HKP client: {e}")))?;

        Ok(Self {
            client,
            base_url: server.trim_end_matches('/').to_string(),
        })
    }

    /// `GET /pks/lookup?op=get&search=0x<fp>` — returns the armored key.
    pub async fn get_key(&self, fingerprint: &str) -> Result<String> {
        let url = format!(
            "{}/pks/lookup?op=get&options=mr&search=0x{}",
            self.base_url, fingerprint
        );
        debug!(%url, "HKP lookup");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SignerError::RemoteKeyserverFailure(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SignerError::RemoteKeyserverFailure(e.to_string()))?;

        if !status.is_success() {
            return Err(SignerError::RemoteKeyserverFailure(body));
        }
        Ok(body)
    }

    /// `POST /pks/add` with the armored key as the `keytext` form field.
    pub async fn add_key(&self, armored: &str) -> Result<()> {
        let url = format!("{}/pks/add", self.base_url);
        debug!(%url, "HKP add");

        let resp = self
            .client
            .post(&url)
            .form(&[("keytext", armored)])
            .send()
            .await
            .map_err(|e| SignerError::RemoteKeyserverFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SignerError::RemoteKeyserverFailure(body));
        }
        Ok(())
    }
}

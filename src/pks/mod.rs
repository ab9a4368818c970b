/// Public-key store: resolves public keys by fingerprint, name or email
/// through the internal database or an external HKP keyserver.
pub mod database;
pub mod hkp;

pub use database::{GpgKeyRecord, KeyDatabase};
pub use hkp::HkpClient;

use tracing::{info, warn};

use crate::error::{Result, SignerError};

pub struct PublicKeyStore {
    database: Option<KeyDatabase>,
    external: Option<HkpClient>,
}

impl PublicKeyStore {
    pub fn new(database: Option<KeyDatabase>, external: Option<HkpClient>) -> Self {
        Self { database, external }
    }

    /// Resolves a key by fingerprint: local store first, then the external
    /// keyserver when one is configured.
    pub async fn get_key(&self, fingerprint: &str) -> Result<String> {
        if let Some(db) = &self.database {
            if let Some(record) = db.by_fingerprint(fingerprint).await? {
                return Ok(record.ascii_armored_public_key);
            }
        }

        if let Some(external) = &self.external {
            return external.get_key(fingerprint).await;
        }

        Err(SignerError::KeyNotFound(fingerprint.to_string()))
    }

    /// Adds an armored public key, returning `"OK"` on success and an error
    /// string otherwise (the keyserver-protocol contract).
    pub async fn add(&self, armored: &str) -> String {
        if let Some(db) = &self.database {
            return match GpgKeyRecord::from_armored(armored) {
                Ok(record) => match db.add(&record).await {
                    Ok(()) => {
                        info!(fingerprint = %record.full_fingerprint, "Public key added");
                        "OK".to_string()
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot store public key");
                        "Invalid Public Key".to_string()
                    }
                },
                Err(_) => "Invalid Public Key".to_string(),
            };
        }

        if let Some(external) = &self.external {
            return match external.add_key(armored).await {
                Ok(()) => "OK".to_string(),
                Err(e) => {
                    warn!(error = %e, "Keyserver add failed");
                    "Invalid Public Key".to_string()
                }
            };
        }

        "Invalid Public Key".to_string()
    }

    pub async fn search(
        &self,
        value: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.internal()?.search(value, page_start, page_end).await
    }

    pub async fn search_by_name(
        &self,
        name: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.internal()?
            .search_by_name(name, page_start, page_end)
            .await
    }

    pub async fn search_by_fingerprint(
        &self,
        fingerprint: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.internal()?
            .search_by_fingerprint(fingerprint, page_start, page_end)
            .await
    }

    pub async fn search_by_email(
        &self,
        email: &str,
        page_start: i64,
        page_end: i64,
    ) -> Result<Vec<GpgKeyRecord>> {
        self.internal()?
            .search_by_email(email, page_start, page_end)
            .await
    }

    /// Searches require the internal store; the HKP protocol has no
    /// name/email search.
    fn internal(&self) -> Result<&KeyDatabase> {
        self.database.as_ref().ok_or(SignerError::NotImplemented)
    }
}

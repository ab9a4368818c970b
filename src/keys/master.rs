/// The master key: a single key pair loaded at startup and used only to
/// wrap and unwrap private-key records at rest. Immutable after load.
use std::fs;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgp::types::SecretKeyTrait;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, SignerError};
use crate::keys::entity::{KeyEntity, SecurePassphrase};
use crate::keys::read_secret_keys;

pub struct MasterKey {
    entity: KeyEntity,
}

impl MasterKey {
    /// Loads and unlocks the master key described by the configuration.
    /// Returns `None` when no master key is configured.
    pub fn load(config: &Config) -> Result<Option<Self>> {
        let Some(key_path) = &config.master_key_path else {
            return Ok(None);
        };
        let password_path = config.master_key_password_path.as_ref().ok_or_else(|| {
            SignerError::ConfigurationInvalid(
                "master key configured without a passphrase file".into(),
            )
        })?;

        let mut armored = fs::read_to_string(key_path)?;
        if config.master_key_base64 {
            let decoded = BASE64.decode(armored.trim()).map_err(|e| {
                SignerError::InvalidKeyMaterial(format!("master key base64: {e}"))
            })?;
            armored = String::from_utf8(decoded).map_err(|e| {
                SignerError::InvalidKeyMaterial(format!("master key encoding: {e}"))
            })?;
        }

        let passphrase = fs::read_to_string(password_path)?;
        let master = Self::from_armored(&armored, passphrase.trim_end())?;
        info!(fingerprint = %master.entity.fp16(), "Master key loaded and unlocked");
        Ok(Some(master))
    }

    /// Builds a master key from armored private material, validating the
    /// passphrase against the primary key.
    pub fn from_armored(armored: &str, passphrase: &str) -> Result<Self> {
        let secret_key = read_secret_keys(armored)?
            .into_iter()
            .next()
            .ok_or_else(|| SignerError::InvalidKeyMaterial("no master key found".into()))?;

        secret_key
            .unlock(|| passphrase.to_string(), |_| Ok(()))
            .map_err(|_| SignerError::BadPassphrase("master key".into()))?;

        let mut entity = KeyEntity::from_secret(secret_key)?;
        entity.passphrase = Some(SecurePassphrase::new(passphrase));
        Ok(Self { entity })
    }

    pub fn fp16(&self) -> String {
        self.entity.fp16()
    }

    pub fn entity(&self) -> &KeyEntity {
        &self.entity
    }
}

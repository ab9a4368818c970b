/// Key record codec: private keys at rest are wrapped in an OpenPGP message
/// encrypted to the master key. The backend does not tag records, so unwrap
/// detects plain records by attempting to parse them as a key first.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgp::composed::{Deserializable, Message, SignedSecretKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::CompressionAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignerError};
use crate::keys::{encryption_subkey, MasterKey};

const MESSAGE_HEADER: &str = "-----BEGIN PGP MESSAGE-----";

/// Metadata stored next to each key record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRecordMetadata {
    /// fp16 of every subkey of the stored key.
    #[serde(rename = "Subkeys", default)]
    pub subkeys: Vec<String>,
    /// The record data is base64-wrapped on top of the armor.
    #[serde(rename = "Base64", default)]
    pub base64: bool,
}

impl KeyRecordMetadata {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

/// Encrypts an armored private key to the master key for storage:
/// literal → ZLIB → AES-256 → armor, optionally base64 on top.
pub fn wrap(
    master: Option<&MasterKey>,
    armored_key: &str,
    encode_base64: bool,
) -> Result<String> {
    let master = master.ok_or_else(|| {
        SignerError::MasterKeyUnavailable("no master key loaded".into())
    })?;

    let message = Message::new_literal_bytes("", armored_key.as_bytes())
        .compress(CompressionAlgorithm::ZLIB)?;

    let mut rng = rand::thread_rng();
    let public_key = &master.entity().public_key;
    let encrypted = match encryption_subkey(public_key) {
        Some(subkey) => {
            message.encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES256, &[subkey])?
        }
        None => message.encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES256, &[public_key])?,
    };

    let armored = encrypted.to_armored_string(None)?;
    if encode_base64 {
        Ok(BASE64.encode(armored))
    } else {
        Ok(armored)
    }
}

/// Reverses [`wrap`]: returns the plaintext armored private key. Records
/// that were never wrapped pass through untouched.
pub fn unwrap(master: Option<&MasterKey>, record: &str, base64_wrapped: bool) -> Result<String> {
    // Plain records parse as a key directly.
    if SignedSecretKey::from_string(record).is_ok() {
        return Ok(record.to_string());
    }

    let armored = if record.trim_start().starts_with(MESSAGE_HEADER) {
        record.to_string()
    } else if base64_wrapped || !record.contains("-----BEGIN") {
        let decoded = BASE64
            .decode(record.trim())
            .map_err(|e| SignerError::InvalidKeyMaterial(format!("record base64: {e}")))?;
        let text = String::from_utf8(decoded)
            .map_err(|e| SignerError::InvalidKeyMaterial(format!("record encoding: {e}")))?;
        // A base64 wrapper may hide either form.
        if SignedSecretKey::from_string(&text).is_ok() {
            return Ok(text);
        }
        text
    } else {
        record.to_string()
    };

    let master = master.ok_or_else(|| {
        SignerError::MasterKeyUnavailable("record is encrypted but no master key is loaded".into())
    })?;

    let (message, _) = Message::from_string(&armored)
        .map_err(|e| SignerError::InvalidKeyMaterial(format!("record message: {e}")))?;

    let secret_key = master
        .entity()
        .secret_key
        .as_ref()
        .ok_or_else(|| SignerError::MasterKeyUnavailable("master key has no secret".into()))?;
    let passphrase = master
        .entity()
        .passphrase
        .as_ref()
        .ok_or_else(|| SignerError::MasterKeyUnavailable("master key is locked".into()))?
        .clone();

    let (mut decrypter, _) = message.decrypt(|| passphrase.expose().to_string(), &[secret_key])?;
    let decrypted = decrypter
        .next()
        .ok_or_else(|| SignerError::InvalidKeyMaterial("no decrypted message".into()))??;
    let decrypted = decrypted.decompress()?;

    let content = decrypted
        .get_content()?
        .ok_or_else(|| SignerError::InvalidKeyMaterial("empty key record".into()))?;

    String::from_utf8(content)
        .map_err(|e| SignerError::InvalidKeyMaterial(format!("record encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::testutil::{test_entity, TEST_PASSPHRASE};
    use crate::keys::MasterKey;

    fn test_master() -> MasterKey {
        let entity = test_entity("Master Key");
        let armored = entity
            .secret_key
            .as_ref()
            .unwrap()
            .to_armored_string(None)
            .unwrap();
        MasterKey::from_armored(&armored, TEST_PASSPHRASE).unwrap()
    }

    fn test_key_armor() -> String {
        test_entity("Stored Key")
            .secret_key
            .as_ref()
            .unwrap()
            .to_armored_string(None)
            .unwrap()
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let master = test_master();
        let key = test_key_armor();

        let wrapped = wrap(Some(&master), &key, false).unwrap();
        assert!(wrapped.starts_with(MESSAGE_HEADER));
        assert_eq!(unwrap(Some(&master), &wrapped, false).unwrap(), key);
    }

    #[test]
    fn test_wrap_unwrap_round_trip_base64() {
        let master = test_master();
        let key = test_key_armor();

        let wrapped = wrap(Some(&master), &key, true).unwrap();
        assert!(!wrapped.contains("-----BEGIN"));
        assert_eq!(unwrap(Some(&master), &wrapped, true).unwrap(), key);
    }

    #[test]
    fn test_unwrap_passes_plain_records_through() {
        let master = test_master();
        let key = test_key_armor();
        assert_eq!(unwrap(Some(&master), &key, false).unwrap(), key);

        // Base64-wrapped but never encrypted.
        let encoded = BASE64.encode(&key);
        assert_eq!(unwrap(Some(&master), &encoded, true).unwrap(), key);
    }

    #[test]
    fn test_wrap_without_master_key() {
        assert!(matches!(
            wrap(None, "anything", false),
            Err(SignerError::MasterKeyUnavailable(_))
        ));
    }

    #[test]
    fn test_unwrap_encrypted_record_without_master_key() {
        let master = test_master();
        let wrapped = wrap(Some(&master), &test_key_armor(), false).unwrap();
        assert!(matches!(
            unwrap(None, &wrapped, false),
            Err(SignerError::MasterKeyUnavailable(_))
        ));
    }

    #[test]
    fn test_metadata_round_trip() {
        let metadata = KeyRecordMetadata {
            subkeys: vec!["0ADF79401F28C569".into()],
            base64: true,
        };
        let parsed = KeyRecordMetadata::from_json(&metadata.to_json());
        assert_eq!(parsed.subkeys, metadata.subkeys);
        assert!(parsed.base64);

        let defaulted = KeyRecordMetadata::from_json("not json");
        assert!(defaulted.subkeys.is_empty());
        assert!(!defaulted.base64);
    }
}

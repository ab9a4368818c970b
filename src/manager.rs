/// The PGP manager: the central operation surface of the service.
///
/// Coordinates the key-ring cache, the storage backend and the master key.
/// All operations take a request context first and check it between
/// OpenPGP packet operations.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pgp::composed::{
    Deserializable, KeyType, Message, SecretKeyParamsBuilder, StandaloneSignature,
    SignedSecretKey, SubkeyParamsBuilder,
};
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::packet::{SignatureConfig, SignatureType, SignatureVersion, Subpacket, SubpacketData};
use pgp::types::{CompressionAlgorithm, KeyTrait, SecretKeyTrait};
use smallvec::smallvec;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::error::{Result, SignerError};
use crate::fingerprint::compare_fingerprint;
use crate::keyring::KeyRingManager;
use crate::keys::record::{self, KeyRecordMetadata};
use crate::keys::{
    encryption_subkey, fingerprints_from_key, fp16_from_key_id, is_private_armor,
    read_public_keys, read_secret_keys, KeyEntity, MasterKey, SecurePassphrase,
};
use crate::pks::PublicKeyStore;
use crate::storage::StorageBackend;

/// Keys below this strength are refused at generation time.
pub const MIN_KEY_BITS: u32 = 2048;
/// Hash used when the caller does not request one.
pub const DEFAULT_HASH: HashAlgorithm = HashAlgorithm::SHA2_512;

const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// Result of a successful decryption.
#[derive(Debug, Clone)]
pub struct DecryptedData {
    /// Plaintext, base64-wrapped for transport.
    pub base64_data: String,
    /// The recipient fingerprint that actually decrypted the message.
    pub fingerprint: String,
    /// File name carried by the literal packet.
    pub filename: String,
}

pub struct PgpManager {
    keyring: KeyRingManager,
    backend: Arc<dyn StorageBackend>,
    master: Option<MasterKey>,
    pks: Option<Arc<PublicKeyStore>>,
    /// Loaded private keys whose passphrase has not been supplied yet.
    locked: RwLock<HashMap<String, SignedSecretKey>>,
    keys_base64: bool,
}

impl PgpManager {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        master: Option<MasterKey>,
        pks: Option<Arc<PublicKeyStore>>,
        max_keyring_cache: usize,
        keys_base64: bool,
    ) -> Self {
        Self {
            keyring: KeyRingManager::new(max_keyring_cache),
            backend,
            master,
            pks,
            locked: RwLock::new(HashMap::new()),
            keys_base64,
        }
    }

    pub fn keyring(&self) -> &KeyRingManager {
        &self.keyring
    }

    pub fn min_key_bits(&self) -> u32 {
        MIN_KEY_BITS
    }

    /// fp16 of every loaded private key that is still locked.
    pub fn locked_fingerprints(&self) -> Vec<String> {
        let locked = self.locked.read().expect("locked map poisoned");
        locked.keys().cloned().collect()
    }

    /// Parses one or more armored key blocks and installs them in the
    /// key-ring. Returns the number of private keys found.
    pub fn load_key(&self, ctx: &RequestContext, armored: &str) -> Result<usize> {
        ctx.check()?;

        if is_private_armor(armored) {
            let keys = read_secret_keys(armored)?;
            let mut count = 0;
            for secret_key in keys {
                ctx.check()?;
                let entity = KeyEntity::from_secret(secret_key.clone())?;
                let fp16 = entity.fp16();
                info!(fingerprint = %fp16, identifier = %entity.identifier, "Private key loaded");
                self.locked
                    .write()
                    .expect("locked map poisoned")
                    .insert(fp16, secret_key);
                self.keyring.add_key(entity.to_public_only(), false);
                count += 1;
            }
            return Ok(count);
        }

        let keys = read_public_keys(armored)?;
        for public_key in keys {
            ctx.check()?;
            let entity = KeyEntity::from_public(public_key);
            info!(fingerprint = %entity.fp16(), identifier = %entity.identifier, "Public key loaded");
            self.keyring.add_key(entity, false);
        }
        Ok(0)
    }

    /// Scans the storage backend and loads every record, unwrapping under
    /// the master key where needed. Errors are per-record: they are logged
    /// and the scan continues.
    pub async fn load_keys(&self, ctx: &RequestContext) -> Result<usize> {
        let names = self.backend.list().await?;
        info!(count = names.len(), backend = self.backend.name(), "Loading key records");

        let mut loaded = 0;
        for name in names {
            ctx.check()?;
            let result = self.load_record(ctx, &name).await;
            match result {
                Ok(n) => loaded += n,
                Err(e) => warn!(record = %name, error = %e, "Skipping unreadable key record"),
            }
        }
        Ok(loaded)
    }

    async fn load_record(&self, ctx: &RequestContext, name: &str) -> Result<usize> {
        let (data, metadata) = self.backend.read(name).await?;
        let metadata = KeyRecordMetadata::from_json(&metadata);
        let armored = record::unwrap(
            self.master.as_ref(),
            &data,
            metadata.base64 || self.keys_base64,
        )?;
        self.load_key(ctx, &armored)
    }

    /// Wraps a private key under the master key and persists it with its
    /// subkey metadata.
    pub async fn save_key(&self, ctx: &RequestContext, fp16: &str, armored: &str) -> Result<()> {
        ctx.check()?;
        let metadata = KeyRecordMetadata {
            subkeys: fingerprints_from_key(armored)?.into_iter().skip(1).collect(),
            base64: self.keys_base64,
        };

        let data = if self.master.is_some() {
            record::wrap(self.master.as_ref(), armored, self.keys_base64)?
        } else if self.keys_base64 {
            BASE64.encode(armored)
        } else {
            armored.to_string()
        };

        self.backend
            .save_with_metadata(fp16, &data, &metadata.to_json())
            .await
    }

    /// Validates the passphrase against the primary key and every secret
    /// subkey, then promotes the entity to the private ring. Idempotent
    /// under concurrency: the last unlock wins.
    pub fn unlock_key(&self, ctx: &RequestContext, fingerprint: &str, passphrase: &str) -> Result<String> {
        ctx.check()?;
        let fp = fingerprint.to_uppercase();
        let (fp16, secret_key) = self
            .find_locked(&fp)
            .ok_or_else(|| SignerError::KeyNotFound(fp.clone()))?;

        secret_key
            .unlock(|| passphrase.to_string(), |_| Ok(()))
            .map_err(|_| SignerError::BadPassphrase(fp16.clone()))?;
        for subkey in &secret_key.secret_subkeys {
            ctx.check()?;
            subkey
                .unlock(|| passphrase.to_string(), |_| Ok(()))
                .map_err(|_| SignerError::BadPassphrase(fp16.clone()))?;
        }

        let mut entity = KeyEntity::from_secret(secret_key)?;
        entity.passphrase = Some(SecurePassphrase::new(passphrase));
        self.keyring.add_key(entity, true);
        info!(fingerprint = %fp16, "Key unlocked");
        Ok(fp16)
    }

    /// Generates an RSA primary key with an RSA encryption subkey, one
    /// identity and the service's algorithm preferences. The private key is
    /// protected by `passphrase` and returned as armor; the new key is not
    /// registered anywhere.
    pub fn generate_key(
        &self,
        ctx: &RequestContext,
        identifier: &str,
        passphrase: &str,
        bits: u32,
    ) -> Result<String> {
        if bits < MIN_KEY_BITS {
            return Err(SignerError::KeyTooWeak(bits, MIN_KEY_BITS));
        }
        ctx.check()?;

        let subkey = SubkeyParamsBuilder::default()
            .key_type(KeyType::Rsa(bits))
            .can_encrypt(true)
            .passphrase(Some(passphrase.to_string()))
            .build()
            .map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))?;

        let params = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(bits))
            .can_create_certificates(true)
            .can_sign(true)
            .primary_user_id(identifier.to_string())
            .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
            .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_512])
            .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
            .passphrase(Some(passphrase.to_string()))
            .subkey(subkey)
            .build()
            .map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))?;

        let secret_key = params.generate()?;
        ctx.check()?;
        let signed = secret_key.sign(|| passphrase.to_string())?;

        info!(fingerprint = %hex::encode_upper(signed.fingerprint()), identifier, bits, "Key generated");
        Ok(signed.to_armored_string(None)?)
    }

    /// Produces a detached armored signature over `data` with the requested
    /// hash. The key must be in the private ring and unlocked.
    pub fn sign_data(
        &self,
        ctx: &RequestContext,
        fingerprint: &str,
        data: &[u8],
        hash: HashAlgorithm,
    ) -> Result<String> {
        ctx.check()?;
        let fp = fingerprint.to_uppercase();
        let entity = self.keyring.get_private_key(&fp).ok_or_else(|| {
            if self.find_locked(&fp).is_some() {
                SignerError::KeyNotUnlocked(fp.clone())
            } else {
                SignerError::KeyNotFound(fp.clone())
            }
        })?;

        let secret_key = entity
            .secret_key
            .as_ref()
            .ok_or_else(|| SignerError::KeyNotUnlocked(fp.clone()))?;
        let passphrase = entity
            .passphrase
            .as_ref()
            .ok_or_else(|| SignerError::KeyNotUnlocked(fp.clone()))?
            .clone();

        let config = SignatureConfig::new_v4(
            SignatureVersion::V4,
            SignatureType::Binary,
            secret_key.algorithm(),
            hash,
            vec![
                Subpacket::regular(SubpacketData::SignatureCreationTime(chrono::Utc::now())),
                Subpacket::regular(SubpacketData::Issuer(secret_key.key_id())),
            ],
            vec![],
        );

        ctx.check()?;
        let signature = config.sign(secret_key, || passphrase.expose().to_string(), data)?;
        let armored = StandaloneSignature::new(signature).to_armored_string(None)?;
        Ok(armored)
    }

    /// Verifies a detached signature over `data`. Accepts the Quanto form
    /// and repairs malformed armor before parsing. A well-formed signature
    /// that does not match yields `Ok(false)`; an issuer that resolves to
    /// no known key is `UnknownSigner`.
    pub async fn verify_signature(
        &self,
        ctx: &RequestContext,
        data: &[u8],
        signature: &str,
    ) -> Result<bool> {
        ctx.check()?;

        let armored = if signature.trim_start().starts_with(SIGNATURE_HEADER) {
            signature.to_string()
        } else {
            let converted = crate::quanto::quanto_to_armored(signature);
            if converted.is_empty() {
                return Err(SignerError::InvalidSignatureFormat(
                    "not an armored or Quanto signature".into(),
                ));
            }
            converted
        };

        let parsed = match StandaloneSignature::from_string(&armored) {
            Ok((sig, _)) => sig,
            Err(_) => {
                let fixed = crate::quanto::signature_fix(&armored)?;
                StandaloneSignature::from_string(&fixed)
                    .map_err(|e| SignerError::InvalidSignatureFormat(e.to_string()))?
                    .0
            }
        };

        let issuer = parsed
            .signature
            .issuer()
            .map(fp16_from_key_id)
            .ok_or_else(|| SignerError::UnknownSigner("no issuer".into()))?;

        ctx.check()?;
        let entity = self
            .resolve_public_entity(&issuer)
            .await
            .map_err(|_| SignerError::UnknownSigner(issuer.clone()))?;

        // The issuer may be the primary key or any subkey.
        if parsed.verify(&entity.public_key, data).is_ok() {
            return Ok(true);
        }
        for subkey in &entity.public_key.public_subkeys {
            if parsed.verify(subkey, data).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Builds an AES-256 + ZLIB OpenPGP message for the key `fingerprint`
    /// resolves to. `data_only` selects raw-binary base64 output instead of
    /// ASCII armor.
    pub async fn encrypt(
        &self,
        ctx: &RequestContext,
        filename: &str,
        fingerprint: &str,
        data: &[u8],
        data_only: bool,
    ) -> Result<String> {
        ctx.check()?;
        let entity = self.resolve_public_entity(fingerprint).await?;

        let message = Message::new_literal_bytes(filename, data)
            .compress(CompressionAlgorithm::ZLIB)?;

        ctx.check()?;
        let mut rng = rand::thread_rng();
        let encrypted = match encryption_subkey(&entity.public_key) {
            Some(subkey) => {
                message.encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES256, &[subkey])?
            }
            None => message.encrypt_to_keys(
                &mut rng,
                SymmetricKeyAlgorithm::AES256,
                &[&entity.public_key],
            )?,
        };

        if data_only {
            use pgp::ser::Serialize;
            Ok(BASE64.encode(encrypted.to_bytes()?))
        } else {
            Ok(encrypted.to_armored_string(None)?)
        }
    }

    /// Decrypts an OpenPGP message with whichever unlocked private key
    /// matches one of the message's recipients.
    pub fn decrypt(
        &self,
        ctx: &RequestContext,
        payload: &str,
        data_only: bool,
    ) -> Result<DecryptedData> {
        ctx.check()?;

        let message = if data_only {
            let raw = BASE64
                .decode(payload.trim())
                .map_err(|e| SignerError::InvalidBody(format!("payload base64: {e}")))?;
            Message::from_bytes(std::io::Cursor::new(raw))
                .map_err(|e| SignerError::InvalidBody(e.to_string()))?
        } else {
            Message::from_string(payload)
                .map_err(|e| SignerError::InvalidBody(e.to_string()))?
                .0
        };

        let recipients = crate::keys::recipients_from_message(&message);
        if recipients.is_empty() {
            return Err(SignerError::InvalidBody("no encrypted session key found".into()));
        }

        let unlocked = self.keyring.private_entities();
        let (recipient_fp, entity) = recipients
            .iter()
            .find_map(|fp| {
                unlocked
                    .iter()
                    .find(|entity| {
                        entity
                            .all_fp16s()
                            .iter()
                            .any(|candidate| compare_fingerprint(candidate, fp))
                    })
                    .map(|entity| (fp.clone(), entity.clone()))
            })
            .ok_or(SignerError::NoPrivateKeyForRecipient(recipients.clone()))?;

        let secret_key = entity
            .secret_key
            .as_ref()
            .ok_or_else(|| SignerError::KeyNotUnlocked(recipient_fp.clone()))?;
        let passphrase = entity
            .passphrase
            .as_ref()
            .ok_or_else(|| SignerError::KeyNotUnlocked(recipient_fp.clone()))?
            .clone();

        ctx.check()?;
        let (mut decrypter, _) =
            message.decrypt(|| passphrase.expose().to_string(), &[secret_key])?;
        let decrypted = decrypter
            .next()
            .ok_or_else(|| SignerError::InvalidBody("no decrypted message".into()))??;
        let decrypted = decrypted.decompress()?;

        let content = decrypted
            .get_content()?
            .ok_or_else(|| SignerError::InvalidBody("message has no content".into()))?;
        let filename = decrypted
            .get_literal()
            .map(|lit| String::from_utf8_lossy(lit.file_name()).to_string())
            .unwrap_or_default();

        Ok(DecryptedData {
            base64_data: BASE64.encode(content),
            fingerprint: recipient_fp,
            filename,
        })
    }

    /// Armored public key export. Unknown keys come back as an empty
    /// string; this operation never fails.
    pub async fn get_public_key_ascii(&self, ctx: &RequestContext, fingerprint: &str) -> String {
        if ctx.check().is_err() {
            return String::new();
        }
        match self.resolve_public_entity(fingerprint).await {
            Ok(entity) => entity.public_key.to_armored_string(None).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    /// Key-ring lookup with PKS fallback. A key fetched from the PKS is
    /// cached in the public ring.
    async fn resolve_public_entity(&self, fingerprint: &str) -> Result<KeyEntity> {
        let fp = fingerprint.to_uppercase();
        if let Some(entity) = self.keyring.get_key(&fp) {
            return Ok(entity);
        }

        let Some(pks) = &self.pks else {
            return Err(SignerError::KeyNotFound(fp));
        };
        let armored = pks
            .get_key(&fp)
            .await
            .map_err(|_| SignerError::KeyNotFound(fp.clone()))?;
        let key = read_public_keys(&armored)?
            .into_iter()
            .next()
            .ok_or_else(|| SignerError::KeyNotFound(fp.clone()))?;

        let entity = KeyEntity::from_public(key);
        self.keyring.add_key(entity.clone(), false);
        Ok(entity)
    }

    fn find_locked(&self, fingerprint: &str) -> Option<(String, SignedSecretKey)> {
        let locked = self.locked.read().expect("locked map poisoned");
        if let Some(key) = locked.get(fingerprint) {
            return Some((fingerprint.to_string(), key.clone()));
        }
        locked
            .iter()
            .find(|(stored, _)| compare_fingerprint(stored, fingerprint))
            .map(|(stored, key)| (stored.clone(), key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::void::VoidBackend;

    const TEST_DATA: &[u8] = b"huebr for the win!";
    const TEST_PASSWORD: &str = "123456";

    fn manager() -> PgpManager {
        PgpManager::new(Arc::new(VoidBackend), None, None, 1000, false)
    }

    fn loaded_and_unlocked(man: &PgpManager) -> String {
        let ctx = RequestContext::background();
        let armored = man
            .generate_key(&ctx, "Test", TEST_PASSWORD, MIN_KEY_BITS)
            .unwrap();
        let count = man.load_key(&ctx, &armored).unwrap();
        assert_eq!(count, 1);
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();
        man.unlock_key(&ctx, &fp16, TEST_PASSWORD).unwrap()
    }

    #[tokio::test]
    async fn test_generate_load_sign_verify() {
        let man = manager();
        let ctx = RequestContext::background();
        let fp16 = loaded_and_unlocked(&man);

        let signature = man.sign_data(&ctx, &fp16, TEST_DATA, DEFAULT_HASH).unwrap();
        assert!(signature.starts_with("-----BEGIN PGP SIGNATURE-----"));

        let valid = man.verify_signature(&ctx, TEST_DATA, &signature).await.unwrap();
        assert!(valid);

        // One corrupted byte must flip the verdict, not error out.
        let mut corrupted = TEST_DATA.to_vec();
        corrupted[0] ^= 0xFF;
        let valid = man
            .verify_signature(&ctx, &corrupted, &signature)
            .await
            .unwrap();
        assert!(!valid);
    }

    #[tokio::test]
    async fn test_quanto_signature_round_trip_verifies() {
        let man = manager();
        let ctx = RequestContext::background();
        let fp16 = loaded_and_unlocked(&man);

        let armored = man.sign_data(&ctx, &fp16, TEST_DATA, DEFAULT_HASH).unwrap();
        let quanto = crate::quanto::armored_to_quanto(&armored, &fp16, "SHA512");
        assert!(quanto.starts_with(&format!("{fp16}_SHA512_")));

        let valid = man.verify_signature(&ctx, TEST_DATA, &quanto).await.unwrap();
        assert!(valid);
    }

    #[test]
    fn test_sign_requires_unlock() {
        let man = manager();
        let ctx = RequestContext::background();
        let armored = man
            .generate_key(&ctx, "Locked", TEST_PASSWORD, MIN_KEY_BITS)
            .unwrap();
        man.load_key(&ctx, &armored).unwrap();
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();

        assert!(matches!(
            man.sign_data(&ctx, &fp16, TEST_DATA, DEFAULT_HASH),
            Err(SignerError::KeyNotUnlocked(_))
        ));
        assert!(matches!(
            man.sign_data(&ctx, "DOESNOTEXIST0000", TEST_DATA, DEFAULT_HASH),
            Err(SignerError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_unlock_with_wrong_passphrase() {
        let man = manager();
        let ctx = RequestContext::background();
        let armored = man
            .generate_key(&ctx, "Wrong", TEST_PASSWORD, MIN_KEY_BITS)
            .unwrap();
        man.load_key(&ctx, &armored).unwrap();
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();

        assert!(matches!(
            man.unlock_key(&ctx, &fp16, "not-the-passphrase"),
            Err(SignerError::BadPassphrase(_))
        ));
        assert!(matches!(
            man.unlock_key(&ctx, "DOESNOTEXIST0000", TEST_PASSWORD),
            Err(SignerError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_generate_rejects_weak_keys() {
        let man = manager();
        let ctx = RequestContext::background();
        assert!(matches!(
            man.generate_key(&ctx, "Weak", TEST_PASSWORD, 1024),
            Err(SignerError::KeyTooWeak(1024, MIN_KEY_BITS))
        ));
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip_armored() {
        let man = manager();
        let ctx = RequestContext::background();
        let fp16 = loaded_and_unlocked(&man);

        let encrypted = man
            .encrypt(&ctx, "testing", &fp16, TEST_DATA, false)
            .await
            .unwrap();
        assert!(encrypted.starts_with("-----BEGIN PGP MESSAGE-----"));

        let decrypted = man.decrypt(&ctx, &encrypted, false).unwrap();
        assert_eq!(BASE64.decode(decrypted.base64_data).unwrap(), TEST_DATA);
        assert_eq!(decrypted.filename, "testing");
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip_raw() {
        let man = manager();
        let ctx = RequestContext::background();
        let fp16 = loaded_and_unlocked(&man);

        let encrypted = man.encrypt(&ctx, "", &fp16, TEST_DATA, true).await.unwrap();
        assert!(!encrypted.contains("BEGIN PGP"));

        let decrypted = man.decrypt(&ctx, &encrypted, true).unwrap();
        assert_eq!(BASE64.decode(decrypted.base64_data).unwrap(), TEST_DATA);
    }

    #[tokio::test]
    async fn test_decrypt_without_private_key() {
        let man = manager();
        let ctx = RequestContext::background();

        // Load the key but never unlock it: decryption must name the
        // recipients it cannot serve.
        let armored = man
            .generate_key(&ctx, "Sealed", TEST_PASSWORD, MIN_KEY_BITS)
            .unwrap();
        man.load_key(&ctx, &armored).unwrap();
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();

        let encrypted = man.encrypt(&ctx, "", &fp16, TEST_DATA, false).await.unwrap();
        assert!(matches!(
            man.decrypt(&ctx, &encrypted, false),
            Err(SignerError::NoPrivateKeyForRecipient(_))
        ));
    }

    #[tokio::test]
    async fn test_get_public_key_ascii_never_fails() {
        let man = manager();
        let ctx = RequestContext::background();
        let fp16 = loaded_and_unlocked(&man);

        let armored = man.get_public_key_ascii(&ctx, &fp16).await;
        assert!(armored.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));

        let missing = man.get_public_key_ascii(&ctx, "0000000000000000").await;
        assert_eq!(missing, "");
    }

    #[test]
    fn test_cancelled_context_stops_operations() {
        let man = manager();
        let ctx = RequestContext::background();
        ctx.cancel();
        assert!(matches!(
            man.generate_key(&ctx, "Nope", TEST_PASSWORD, MIN_KEY_BITS),
            Err(SignerError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_load_keys_from_backend() {
        use crate::storage::disk::DiskBackend;

        let folder = std::env::temp_dir().join(format!(
            "signet-manager-{}",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&folder).unwrap();
        let backend = Arc::new(DiskBackend::new(folder.to_str().unwrap(), "key_", false));

        let man = PgpManager::new(backend.clone(), None, None, 1000, false);
        let ctx = RequestContext::background();

        let armored = man
            .generate_key(&ctx, "Stored", TEST_PASSWORD, MIN_KEY_BITS)
            .unwrap();
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();
        man.save_key(&ctx, &fp16, &armored).await.unwrap();

        // A fresh manager over the same folder must pick the key up.
        let fresh = PgpManager::new(backend, None, None, 1000, false);
        let loaded = fresh.load_keys(&ctx).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(fresh.keyring().contains_key(&fp16));
        assert!(fresh.locked_fingerprints().contains(&fp16));
    }
}

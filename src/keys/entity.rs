/// Key entity: an OpenPGP primary key with identities and subkeys, plus the
/// optional private material and cached passphrase that make it signable.
use std::fmt;

use pgp::composed::signed_key::SignedPublicSubKey;
use pgp::composed::{SignedPublicKey, SignedSecretKey};
use pgp::types::{KeyTrait, SecretKeyTrait};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::fingerprint::fp16_from_bytes;

/// A passphrase that is zeroized when dropped, so LRU eviction of a private
/// ring entry clears the in-memory secret material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurePassphrase(String);

impl SecurePassphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecurePassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurePassphrase(..)")
    }
}

#[derive(Clone)]
pub struct KeyEntity {
    /// Full primary-key fingerprint, uppercase hex.
    pub fingerprint: String,
    /// First user id of the key, e.g. `Name <email>`.
    pub identifier: String,
    pub public_key: SignedPublicKey,
    pub secret_key: Option<SignedSecretKey>,
    /// Present once the key has been unlocked.
    pub passphrase: Option<SecurePassphrase>,
}

impl KeyEntity {
    pub fn from_public(public_key: SignedPublicKey) -> Self {
        let fingerprint = hex::encode_upper(public_key.fingerprint());
        let identifier = first_user_id(&public_key);
        Self {
            fingerprint,
            identifier,
            public_key,
            secret_key: None,
            passphrase: None,
        }
    }

    pub fn from_secret(secret_key: SignedSecretKey) -> Result<Self> {
        let public_subkeys = secret_key
            .public_subkeys
            .clone()
            .into_iter()
            .chain(secret_key.secret_subkeys.iter().map(|sub| SignedPublicSubKey {
                key: sub.key.public_key(),
                signatures: sub.signatures.clone(),
            }))
            .collect();
        let public_key = SignedPublicKey::new(
            secret_key.primary_key.public_key(),
            secret_key.details.clone(),
            public_subkeys,
        );
        let mut entity = Self::from_public(public_key);
        entity.secret_key = Some(secret_key);
        Ok(entity)
    }

    pub fn fp16(&self) -> String {
        fp16_from_bytes(&self.public_key.fingerprint())
    }

    /// fp16 of every subkey, in key order.
    pub fn subkey_fp16s(&self) -> Vec<String> {
        self.public_key
            .public_subkeys
            .iter()
            .map(|sub| fp16_from_bytes(&sub.fingerprint()))
            .collect()
    }

    /// All fp16 values this entity answers to: primary first, then subkeys.
    pub fn all_fp16s(&self) -> Vec<String> {
        let mut fps = vec![self.fp16()];
        fps.extend(self.subkey_fp16s());
        fps
    }

    pub fn is_unlocked(&self) -> bool {
        self.secret_key.is_some() && self.passphrase.is_some()
    }

    /// A copy safe for the public ring: no private material, no passphrase.
    pub fn to_public_only(&self) -> Self {
        Self {
            fingerprint: self.fingerprint.clone(),
            identifier: self.identifier.clone(),
            public_key: self.public_key.clone(),
            secret_key: None,
            passphrase: None,
        }
    }
}

impl fmt::Debug for KeyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntity")
            .field("fingerprint", &self.fingerprint)
            .field("identifier", &self.identifier)
            .field("has_secret", &self.secret_key.is_some())
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

fn first_user_id(key: &SignedPublicKey) -> String {
    key.details
        .users
        .first()
        .map(|user| String::from_utf8_lossy(user.id.id()).to_string())
        .unwrap_or_default()
}

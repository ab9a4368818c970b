/// Proxy-token validation for the agent endpoint.
///
/// Tokens are HS256 JWTs whose claims carry the fingerprint the holder
/// signs with. Validation failures all collapse to `PermissionDenied`; the
/// proxy must not leak why a token was rejected.
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignerError};

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentClaims {
    /// Token subject (user identifier).
    pub sub: String,
    /// Fingerprint this user signs with; falls back to the configured
    /// agent fingerprint when absent.
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Expiration (Unix timestamp).
    pub exp: usize,
}

pub trait TokenManager: Send + Sync {
    fn verify(&self, token: &str) -> Result<AgentClaims>;
}

pub struct JwtTokenManager {
    secret: String,
}

impl JwtTokenManager {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl TokenManager for JwtTokenManager {
    fn verify(&self, token: &str) -> Result<AgentClaims> {
        let data = decode::<AgentClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| SignerError::PermissionDenied("invalid proxy token".into()))?;
        Ok(data.claims)
    }
}

/// Environment-driven configuration.
///
/// All knobs come from environment variables so the service can run
/// unmodified inside a container. Unparsable numeric values are a startup
/// failure rather than a silent fallback.
use std::env;

use crate::error::{Result, SignerError};

/// Default HTTP port when `HTTP_PORT` is unset.
pub const DEFAULT_HTTP_PORT: u16 = 5100;
/// Default bound for the private key-ring cache.
pub const DEFAULT_MAX_KEYRING_CACHE: usize = 1000;

/// Runtime configuration, resolved once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Folder holding the private key records (disk backend).
    pub private_key_folder: String,
    /// File-name prefix for key records.
    pub key_prefix: String,
    /// HTTP listen port.
    pub http_port: u16,
    /// Maximum number of unlocked private keys kept in the ring.
    pub max_keyring_cache: usize,
    /// Path to the master key used to wrap stored private keys.
    pub master_key_path: Option<String>,
    /// Path to the file holding the master key passphrase.
    pub master_key_password_path: Option<String>,
    /// The master key file is base64-wrapped.
    pub master_key_base64: bool,
    /// Stored key records are base64-wrapped.
    pub keys_base64: bool,
    /// External HKP keyserver base URL.
    pub sks_server: Option<String>,
    /// Enable the internal database-backed keyserver.
    pub enable_database_sks: bool,
    /// SQLite URL for the internal keyserver.
    pub database_url: String,
    /// Serve a single pre-unlocked key.
    pub single_key_mode: bool,
    pub single_key_path: Option<String>,
    pub single_key_password: Option<String>,
    /// Default downstream URL for the agent proxy.
    pub agent_target_url: String,
    /// Fingerprint used to sign proxied requests.
    pub agent_key_fingerprint: String,
    /// Skip proxy-token validation.
    pub agent_bypass_login: bool,
    /// HS256 secret for proxy tokens.
    pub agent_token_secret: String,
    /// The key folder is read-only; mirror it into a temp folder.
    pub readonly_keypath: bool,
    /// Store key records in Vault instead of on disk.
    pub vault_storage: bool,
    pub vault_address: String,
    pub vault_root_token: String,
    pub vault_path_prefix: String,
}

impl Config {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let cfg = Config {
            private_key_folder: var_or("PRIVATE_KEY_FOLDER", "./keys"),
            key_prefix: var_or("KEY_PREFIX", ""),
            http_port: parse_var("HTTP_PORT", DEFAULT_HTTP_PORT)?,
            max_keyring_cache: parse_var("MAX_KEYRING_CACHE_SIZE", DEFAULT_MAX_KEYRING_CACHE)?,
            master_key_path: var_opt("MASTER_GPG_KEY_PATH"),
            master_key_password_path: var_opt("MASTER_GPG_KEY_PASSWORD_PATH"),
            master_key_base64: bool_var("MASTER_GPG_KEY_BASE64_ENCODED"),
            keys_base64: bool_var("KEYS_BASE64_ENCODED"),
            sks_server: var_opt("SKS_SERVER"),
            enable_database_sks: bool_var("ENABLE_DATABASE_SKS")
                || bool_var("ENABLE_RETHINK_SKS"),
            database_url: var_or("DATABASE_URL", "sqlite://signet-sks.db?mode=rwc"),
            single_key_mode: bool_var("SINGLE_KEY_MODE"),
            single_key_path: var_opt("SINGLE_KEY_PATH"),
            single_key_password: var_opt("SINGLE_KEY_PASSWORD"),
            agent_target_url: var_or("AGENT_TARGET_URL", "http://localhost:8080"),
            agent_key_fingerprint: var_or("AGENT_KEY_FINGERPRINT", ""),
            agent_bypass_login: bool_var("AGENT_BYPASS_LOGIN"),
            agent_token_secret: var_or("AGENT_TOKEN_SECRET", ""),
            readonly_keypath: bool_var("READONLY_KEYPATH"),
            vault_storage: bool_var("VAULT_STORAGE"),
            vault_address: var_or("VAULT_ADDRESS", "http://localhost:8200"),
            vault_root_token: var_or("VAULT_ROOT_TOKEN", ""),
            vault_path_prefix: var_or("VAULT_PATH_PREFIX", ""),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.single_key_mode && self.single_key_path.is_none() {
            return Err(SignerError::ConfigurationInvalid(
                "SINGLE_KEY_MODE requires SINGLE_KEY_PATH".into(),
            ));
        }
        if self.master_key_path.is_some() && self.master_key_password_path.is_none() {
            return Err(SignerError::ConfigurationInvalid(
                "MASTER_GPG_KEY_PATH requires MASTER_GPG_KEY_PASSWORD_PATH".into(),
            ));
        }
        Ok(())
    }

    /// Listen address for the HTTP server.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn var_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|_| {
            SignerError::ConfigurationInvalid(format!("{name} has an unparsable value: {v}"))
        }),
        _ => Ok(default),
    }
}

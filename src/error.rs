use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Invalid field {field}: {message}")]
    InvalidFieldData { field: String, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bad passphrase for key {0}")]
    BadPassphrase(String),

    #[error("Key {0} was not found")]
    KeyNotFound(String),

    #[error("No unlocked private key for any recipient of the message: {0:?}")]
    NoPrivateKeyForRecipient(Vec<String>),

    #[error("Master key unavailable: {0}")]
    MasterKeyUnavailable(String),

    #[error("Key {0} is not unlocked")]
    KeyNotUnlocked(String),

    #[error("{0} bit keys are below the minimum of {1} bits")]
    KeyTooWeak(u32, u32),

    #[error("Signature issued by unknown key {0}")]
    UnknownSigner(String),

    #[error("Remote keyserver failure: {0}")]
    RemoteKeyserverFailure(String),

    #[error("Operation not supported by the configured key store")]
    NotImplemented,

    #[error("Record {0} was not found")]
    NotFound(String),

    #[error("Storage backend is read-only")]
    ReadOnly,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,

    #[error("Cannot generate a unique request id: retries exhausted")]
    UuidExhausted,

    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenPGP error: {0}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SignerError>;

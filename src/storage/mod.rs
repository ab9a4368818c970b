/// Pluggable storage for named key records.
///
/// A record is an opaque string blob with optional metadata, addressed by a
/// logical name under a configured prefix. Backends are thread-safe at the
/// single-operation level; callers must not assume multi-operation
/// atomicity.
pub mod disk;
pub mod vault;
pub mod void;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// The backend's storage location pattern (folder glob or mount path).
    fn path(&self) -> String;

    /// Persist a record.
    async fn save(&self, name: &str, data: &str) -> Result<()>;

    /// Persist a record together with its metadata.
    async fn save_with_metadata(&self, name: &str, data: &str, metadata: &str) -> Result<()>;

    /// Read a record. Absent metadata is not an error: it comes back empty.
    async fn read(&self, name: &str) -> Result<(String, String)>;

    /// Delete a record and its metadata. Missing records are `NotFound`.
    async fn delete(&self, name: &str) -> Result<()>;

    /// All record names, prefix stripped.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Builds the backend selected by the configuration.
pub fn make_backend(config: &Config) -> Arc<dyn StorageBackend> {
    if config.vault_storage {
        Arc::new(vault::VaultBackend::new(
            &config.vault_address,
            &config.vault_root_token,
            &config.vault_path_prefix,
        ))
    } else {
        Arc::new(disk::DiskBackend::new(
            &config.private_key_folder,
            &config.key_prefix,
            config.readonly_keypath,
        ))
    }
}

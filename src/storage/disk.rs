/// Disk storage backend: one file per record under a configured folder,
/// metadata in a `metadata-` sibling, both written with mode 0600.
///
/// When the folder is marked read-only its contents are mirrored into a
/// fresh temporary folder at construction; if the mirror cannot be built,
/// saving is disabled and later save calls succeed silently with a warning.
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::StorageBackend;
use crate::error::{Result, SignerError};

const METADATA_PREFIX: &str = "metadata-";

pub struct DiskBackend {
    folder: PathBuf,
    prefix: String,
    save_enabled: bool,
}

impl DiskBackend {
    pub fn new(folder: &str, prefix: &str, read_only: bool) -> Self {
        let _ = fs::create_dir_all(folder);
        let mut folder = PathBuf::from(folder);
        let mut save_enabled = true;

        info!(folder = %folder.display(), prefix, "Initialized disk backend");

        if read_only {
            warn!("Read-only key path. Mirroring into temporary storage.");
            match Self::mirror_to_temp(&folder) {
                Ok(tmp) => {
                    info!(from = %folder.display(), to = %tmp.display(), "Key folder mirrored");
                    folder = tmp;
                }
                Err(e) => {
                    error!(error = %e, "Cannot mirror key folder. Disabling save.");
                    save_enabled = false;
                }
            }
        }

        Self {
            folder,
            prefix: prefix.to_string(),
            save_enabled,
        }
    }

    fn mirror_to_temp(folder: &Path) -> Result<PathBuf> {
        let tmp = std::env::temp_dir().join(format!("signet-keys-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&tmp)?;
        for entry in fs::read_dir(folder)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let dst = tmp.join(entry.file_name());
                if let Err(e) = fs::copy(entry.path(), &dst) {
                    warn!(
                        from = %entry.path().display(),
                        to = %dst.display(),
                        error = %e,
                        "Cannot copy key file"
                    );
                }
            }
        }
        Ok(tmp)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.folder.join(format!("{}{}", self.prefix, name))
    }

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.folder
            .join(format!("{}{}{}", METADATA_PREFIX, self.prefix, name))
    }

    async fn write_file(&self, path: &Path, data: &str) -> Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(path).await?;
        file.write_all(data.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    fn name(&self) -> &str {
        "disk"
    }

    fn path(&self) -> String {
        self.folder
            .join(format!("{}*", self.prefix))
            .display()
            .to_string()
    }

    async fn save(&self, name: &str, data: &str) -> Result<()> {
        if !self.save_enabled {
            warn!(name, "Save disabled, key record not persisted");
            return Ok(());
        }
        let path = self.record_path(name);
        debug!(path = %path.display(), "Saving key record");
        self.write_file(&path, data).await
    }

    async fn save_with_metadata(&self, name: &str, data: &str, metadata: &str) -> Result<()> {
        if !self.save_enabled {
            warn!(name, "Save disabled, key record not persisted");
            return Ok(());
        }
        self.save(name, data).await?;
        self.write_file(&self.metadata_path(name), metadata).await
    }

    async fn read(&self, name: &str) -> Result<(String, String)> {
        let path = self.record_path(name);
        debug!(path = %path.display(), "Reading key record");
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| SignerError::NotFound(name.to_string()))?;
        let metadata = tokio::fs::read_to_string(self.metadata_path(name))
            .await
            .unwrap_or_default();
        Ok((data, metadata))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.record_path(name);
        debug!(path = %path.display(), "Deleting key record");
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(SignerError::NotFound(name.to_string()));
        }
        tokio::fs::remove_file(&path).await?;
        let _ = tokio::fs::remove_file(self.metadata_path(name)).await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with(METADATA_PREFIX) {
                continue;
            }
            if file_name.len() > self.prefix.len() && file_name.starts_with(&self.prefix) {
                names.push(file_name[self.prefix.len()..].to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_folder() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("signet-test-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_save_read_delete_round_trip() {
        let folder = temp_folder();
        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", false);

        backend.save("ABCD", "armored material").await.unwrap();
        let (data, metadata) = backend.read("ABCD").await.unwrap();
        assert_eq!(data, "armored material");
        assert_eq!(metadata, "");

        backend.delete("ABCD").await.unwrap();
        assert!(matches!(
            backend.read("ABCD").await,
            Err(SignerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let folder = temp_folder();
        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", false);

        backend
            .save_with_metadata("ABCD", "data", "{\"Subkeys\":[]}")
            .await
            .unwrap();
        let (data, metadata) = backend.read("ABCD").await.unwrap();
        assert_eq!(data, "data");
        assert_eq!(metadata, "{\"Subkeys\":[]}");

        // Metadata lives in a sibling file the listing must skip.
        assert_eq!(backend.list().await.unwrap(), vec!["ABCD".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_record_is_not_found() {
        let folder = temp_folder();
        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", false);
        assert!(matches!(
            backend.delete("NOPE").await,
            Err(SignerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_strips_prefix_and_skips_foreign_files() {
        let folder = temp_folder();
        fs::write(folder.join("key_AAAA"), "a").unwrap();
        fs::write(folder.join("key_BBBB"), "b").unwrap();
        fs::write(folder.join("metadata-key_AAAA"), "m").unwrap();
        fs::write(folder.join("unrelated"), "x").unwrap();
        fs::create_dir_all(folder.join("subdir")).unwrap();

        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", false);
        let mut names = backend.list().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["AAAA".to_string(), "BBBB".to_string()]);
    }

    #[tokio::test]
    async fn test_read_only_folder_mirrors_and_keeps_original_untouched() {
        let folder = temp_folder();
        fs::write(folder.join("key_AAAA"), "original").unwrap();

        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", true);

        // The mirror sees the pre-existing record.
        let (data, _) = backend.read("AAAA").await.unwrap();
        assert_eq!(data, "original");

        // Writes land in the mirror, not the original folder.
        backend.save("BBBB", "new").await.unwrap();
        assert!(!folder.join("key_BBBB").exists());
        let (data, _) = backend.read("BBBB").await.unwrap();
        assert_eq!(data, "new");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_records_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let folder = temp_folder();
        let backend = DiskBackend::new(folder.to_str().unwrap(), "key_", false);
        backend.save("ABCD", "secret").await.unwrap();

        let mode = fs::metadata(folder.join("key_ABCD"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

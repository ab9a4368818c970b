/// Void backend: persists nothing. Used when the service should run purely
/// from memory (tests, single-key mode).
use async_trait::async_trait;

use super::StorageBackend;
use crate::error::{Result, SignerError};

pub struct VoidBackend;

#[async_trait]
impl StorageBackend for VoidBackend {
    fn name(&self) -> &str {
        "void"
    }

    fn path(&self) -> String {
        "*".to_string()
    }

    async fn save(&self, _name: &str, _data: &str) -> Result<()> {
        Ok(())
    }

    async fn save_with_metadata(&self, _name: &str, _data: &str, _metadata: &str) -> Result<()> {
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<(String, String)> {
        Err(SignerError::NotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        Err(SignerError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_void_backend_holds_nothing() {
        let backend = VoidBackend;
        backend.save("ABCD", "data").await.unwrap();
        assert!(backend.read("ABCD").await.is_err());
        assert!(backend.list().await.unwrap().is_empty());
    }
}

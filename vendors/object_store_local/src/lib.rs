use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::vendor::{ObjectStore, ObjectStoreRegistrar};

const DEFAULT_BASE_PATH: &str = "./data/objects";

/// Filesystem-backed `ObjectStore`, keyed by the sha256 of the uploaded lab
/// document (`spec.md` §4.3 step 1). Reads `OBJECT_STORE_BASE_PATH`
/// directly since the `inventory` factory signature takes no config.
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    fn from_env() -> Self {
        let base_path = std::env::var("OBJECT_STORE_BASE_PATH").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());
        Self { base_path: PathBuf::from(base_path) }
    }

    fn path_for(&self, key: &str) -> CoreResult<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(CoreError::ValidationError(format!("invalid object key '{key}'")));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        let path = self.path_for(key)?;
        ensure_parent(&self.base_path)
            .await
            .map_err(|e| CoreError::ExternalStoreError(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::ExternalStoreError(format!("failed to write object '{key}': {e}")))?;
        debug!(key, bytes = bytes.len(), "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> CoreResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| CoreError::ExternalStoreError(format!("failed to read object '{key}': {e}")))
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::ExternalStoreError(format!("failed to delete object '{key}': {e}"))),
        }
    }
}

async fn ensure_parent(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

inventory::submit! {
    ObjectStoreRegistrar {
        name: "local",
        factory: || std::sync::Arc::new(LocalObjectStore::from_env()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let dir = std::env::temp_dir().join(format!("vitalcore-test-{}", uuid::Uuid::new_v4()));
        std::env::set_var("OBJECT_STORE_BASE_PATH", dir.to_str().unwrap());
        let store = LocalObjectStore::from_env();

        store.put("abc123", b"hello world").await.unwrap();
        let read_back = store.get("abc123").await.unwrap();
        assert_eq!(read_back, b"hello world");

        store.delete("abc123").await.unwrap();
        assert!(store.get("abc123").await.is_err());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rejects_a_path_traversal_key() {
        let store = LocalObjectStore::from_env();
        assert!(store.put("../evil", b"x").await.is_err());
    }
}

//! File-backed token store (feature-gated).

use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use rtsession_core::traits::{StoreError, TokenStore};
use tokio::sync::Mutex;

/// File name used under the platform config directory.
const DEFAULT_FILE_NAME: &str = "rtsession/tokens.json";

/// Token store persisted as a flat JSON object.
///
/// Every write rewrites the whole file; the store is meant for a handful of
/// keys.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Create a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under the platform config directory.
    ///
    /// # Errors
    /// Returns error if the platform has no config directory.
    pub fn in_config_dir() -> Result<Self, StoreError> {
        let base = dirs::config_dir()
            .ok_or_else(|| StoreError::Internal("no config directory".to_string()))?;
        Ok(Self::new(base.join(DEFAULT_FILE_NAME)))
    }

    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(values)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("rtsession-test-{}", Uuid::new_v4()))
            .join("tokens.json")
    }

    #[tokio::test]
    async fn test_values_survive_a_new_instance() {
        let path = scratch_path();
        let store = FileTokenStore::new(&path);
        assert_eq!(assert_ok!(store.load("nk.session").await), None);

        assert_ok!(store.save("nk.session", "token-a").await);
        assert_ok!(store.save("nk.deviceid", "dev-1").await);

        let reopened = FileTokenStore::new(&path);
        assert_eq!(
            assert_ok!(reopened.load("nk.session").await).as_deref(),
            Some("token-a")
        );

        assert_ok!(reopened.remove("nk.session").await);
        assert_eq!(assert_ok!(store.load("nk.session").await), None);
        assert_eq!(
            assert_ok!(store.load("nk.deviceid").await).as_deref(),
            Some("dev-1")
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let store = FileTokenStore::new(&path);
        let err = assert_err!(store.load("nk.session").await);
        assert!(matches!(err, StoreError::Corrupt(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

//! In-memory token store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use rtsession_core::traits::{StoreError, TokenStore};

/// In-memory store implementation.
///
/// Useful for tests and short-lived processes.
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one value.
    #[must_use]
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.write() {
            values.insert(key.into(), value.into());
        }
        store
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(key.to_string(), value.to_string());

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    #[tokio::test]
    async fn test_save_load_remove() {
        let store = MemoryTokenStore::new();
        assert_eq!(assert_ok!(store.load("nk.session").await), None);

        assert_ok!(store.save("nk.session", "token-a").await);
        assert_ok!(store.save("nk.session", "token-b").await);
        assert_eq!(
            assert_ok!(store.load("nk.session").await).as_deref(),
            Some("token-b")
        );

        assert_ok!(store.remove("nk.session").await);
        assert_ok!(store.remove("nk.session").await);
        assert_eq!(assert_ok!(store.load("nk.session").await), None);
    }

    #[tokio::test]
    async fn test_with_value() {
        let store = MemoryTokenStore::with_value("nk.deviceid", "dev-1");
        assert_eq!(
            assert_ok!(store.load("nk.deviceid").await).as_deref(),
            Some("dev-1")
        );
    }
}

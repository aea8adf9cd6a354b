//! Stable per-installation device identity.

use rtsession_core::traits::{StoreError, TokenStore};
use uuid::Uuid;

/// Read the persisted device id, or create and persist a new one.
///
/// # Errors
/// Returns error if the store cannot be read or written.
pub async fn device_id<S: TokenStore + ?Sized>(store: &S, key: &str) -> Result<String, StoreError> {
    if let Some(id) = store.load(key).await?.filter(|id| !id.is_empty()) {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    store.save(key, &id).await?;
    tracing::info!(device_id = %id, "Generated new device id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::storage::MemoryTokenStore;

    #[tokio::test]
    async fn test_generated_once() {
        let store = MemoryTokenStore::new();
        let first = assert_ok!(device_id(&store, "nk.deviceid").await);
        let second = assert_ok!(device_id(&store, "nk.deviceid").await);
        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
    }

    #[tokio::test]
    async fn test_existing_id_is_kept() {
        let store = MemoryTokenStore::with_value("nk.deviceid", "dev-42");
        assert_eq!(assert_ok!(device_id(&store, "nk.deviceid").await), "dev-42");
    }
}

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing;

use crate::error::{CoreError, CoreResult};

pub const SESSION_KEY: &str = "ticket_app_session";
pub const OFFLINE_QUEUE_KEY: &str = "offline_queue";
pub const ACTIVE_TIME_SESSION_KEY: &str = "activeTimeSession";
pub const NOTIFICATIONS_KEY: &str = "app_notifications";
pub const USERS_KEY: &str = "users";
pub const TICKETS_KEY: &str = "tickets";
pub const TIME_ENTRIES_KEY: &str = "time_entries";

/// Whole-value JSON blobs under string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> CoreResult<()>;
    async fn remove(&self, key: &str) -> CoreResult<()>;
}

pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> CoreResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> CoreResult<()> {
    store.set(key, serde_json::to_value(value)?).await
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `set`/`remove` fail until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, key: &str) -> CoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Storage(format!("write to {} refused", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> CoreResult<()> {
        self.check_writable(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        self.check_writable(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key. Writes go to a temp file first and are
/// renamed into place so a reader never sees a partial blob.
pub struct FileStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        tracing::info!("Opening file store at {}", dir.display());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> CoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CoreError::Storage(format!("Invalid storage key: {}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> CoreResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&value)?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("Persisted {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("fieldops-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn file_store_round_trips_and_removes() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).await.unwrap();

        assert!(store.get(TICKETS_KEY).await.unwrap().is_none());

        store.set(TICKETS_KEY, json!([{"id": "t-1"}])).await.unwrap();
        let reopened = FileStore::open(&dir).await.unwrap();
        assert_eq!(
            reopened.get(TICKETS_KEY).await.unwrap(),
            Some(json!([{"id": "t-1"}]))
        );

        reopened.remove(TICKETS_KEY).await.unwrap();
        assert!(reopened.get(TICKETS_KEY).await.unwrap().is_none());
        // removing twice is fine
        reopened.remove(TICKETS_KEY).await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).await.unwrap();
        assert!(matches!(
            store.set("../escape", json!(1)).await,
            Err(CoreError::Storage(_))
        ));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn typed_helpers_use_serde() {
        let store = MemoryStore::new();
        save_json(&store, USERS_KEY, &vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, USERS_KEY).await.unwrap();
        assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));

        store.set(USERS_KEY, json!({"not": "a list"})).await.unwrap();
        let bad: CoreResult<Option<Vec<String>>> = load_json(&store, USERS_KEY).await;
        assert!(matches!(bad, Err(CoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn memory_store_can_refuse_writes() {
        let store = MemoryStore::new();
        store.set(TICKETS_KEY, json!([1])).await.unwrap();

        store.set_fail_writes(true);
        assert!(matches!(
            store.set(TICKETS_KEY, json!([2])).await,
            Err(CoreError::Storage(_))
        ));
        assert!(store.remove(TICKETS_KEY).await.is_err());
        assert_eq!(store.get(TICKETS_KEY).await.unwrap(), Some(json!([1])));

        store.set_fail_writes(false);
        store.remove(TICKETS_KEY).await.unwrap();
        assert_eq!(store.get(TICKETS_KEY).await.unwrap(), None);
    }
}

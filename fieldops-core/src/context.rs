use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = FileStore::open(&config.storage.data_dir).await?;

        Ok(AppContext {
            config: Arc::new(config),
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
        })
    }

    /// In-memory context for tests and throwaway runs.
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Self {
        AppContext {
            config: Arc::new(config),
            store: Arc::new(MemoryStore::new()),
            clock,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

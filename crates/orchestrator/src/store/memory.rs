//! In-memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_version, is_under, key_segments, KeyValueStore, StoreEntry, StoreError};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, (String, u64)>,
    /// Highest version handed out, surviving deletes.
    last_version: u64,
}

impl Inner {
    fn insert(&mut self, key: &str, value: &str) -> u64 {
        self.last_version += 1;
        self.entries
            .insert(key.to_string(), (value.to_string(), self.last_version));
        self.last_version
    }
}

/// [`KeyValueStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        key_segments(key)?;
        Ok(self.inner.write().await.insert(key, value))
    }

    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        key_segments(key)?;
        let mut inner = self.inner.write().await;
        let found = inner.entries.get(key).map(|(_, v)| *v);
        check_version(key, expected, found)?;
        Ok(inner.insert(key, value))
    }

    async fn get(&self, key: &str) -> Result<Option<StoreEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.entries.get(key).map(|(value, version)| StoreEntry {
            key: key.to_string(),
            value: value.clone(),
            version: *version,
        }))
    }

    async fn get_list(&self, prefix: &str, recursive: bool) -> Result<Vec<StoreEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .iter()
            .filter(|(key, _)| is_under(prefix, key, recursive))
            .map(|(key, (value, version))| StoreEntry {
                key: key.clone(),
                value: value.clone(),
                version: *version,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.write().await.entries.remove(key);
        Ok(())
    }
}

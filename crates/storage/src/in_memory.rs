use crate::storage_trait::{KvStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry in key order.
    pub fn contents(&self) -> BTreeMap<String, String> {
        self.read().map(|entries| entries.clone()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn matching_keys(entries: &BTreeMap<String, String>, prefix: &str) -> Vec<String> {
        entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut entries = self.write()?;
        let doomed = Self::matching_keys(&entries, prefix);
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(Self::matching_keys(&*self.read()?, prefix))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_operations_only_touch_matching_keys() {
        let store = InMemoryStore::new();
        store.set("attester:testnet:0x1", "a").await.unwrap();
        store.set("attester:testnet:0x2", "b").await.unwrap();
        store.set("attester:mainnet:0x1", "c").await.unwrap();
        store.set("lastBlock:attester:testnet", "10").await.unwrap();

        assert_eq!(
            store.list_keys("attester:testnet:").await.unwrap(),
            vec!["attester:testnet:0x1", "attester:testnet:0x2"]
        );

        assert_eq!(store.delete_prefix("attester:testnet:").await.unwrap(), 2);
        assert!(store.list_keys("attester:testnet:").await.unwrap().is_empty());
        assert_eq!(store.get("attester:mainnet:0x1").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let store = InMemoryStore::new();
        store.set("k", "old").await.unwrap();
        store.set("k", "new").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}

use crate::storage_trait::{KvStore, StoreError};
use async_trait::async_trait;
use rocksdb_rs::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// Single-node durable store for deployments without Redis.
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Encoding(e.to_string()))?;
            keys.push(key);
        }

        Ok(keys)
    }
}

#[async_trait]
impl KvStore for RocksDBStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db
            .put(key.as_bytes(), value.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys = self.keys_with_prefix(prefix)?;
        let mut batch = WriteBatch::default();
        for key in &keys {
            batch.delete(key.as_bytes());
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(keys.len())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.keys_with_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_scan_stops_at_first_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store.set("claim:mainnet:1", "{}").await.unwrap();
        store.set("claim:mainnet:2", "{}").await.unwrap();
        store.set("claim:testnet:1", "{}").await.unwrap();

        assert_eq!(
            store.list_keys("claim:mainnet:").await.unwrap(),
            vec!["claim:mainnet:1", "claim:mainnet:2"]
        );
        assert_eq!(store.delete_prefix("claim:mainnet:").await.unwrap(), 2);
        assert_eq!(store.get("claim:testnet:1").await.unwrap().as_deref(), Some("{}"));
    }
}

mod in_memory;
mod storage_trait;
mod typed;

#[cfg(feature = "redis")]
mod redis_impl;

#[cfg(feature = "rocksdb")]
mod rocksdb_impl;

pub use in_memory::InMemoryStore;
pub use storage_trait::{KvStore, StoreError};
pub use typed::{CheckpointStore, SnapshotStore};

#[cfg(feature = "redis")]
pub use redis_impl::RedisStore;

#[cfg(feature = "rocksdb")]
pub use rocksdb_impl::RocksDBStore;

use std::sync::Arc;

/// Opens the backend named by `url`:
/// `redis://` / `rediss://`, `memory://`, or `rocksdb://<path>`.
pub async fn open_store(url: &str) -> Result<Arc<dyn KvStore>, StoreError> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(InMemoryStore::new()));
    }

    #[cfg(feature = "redis")]
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisStore::connect(url).await?));
    }

    #[cfg(feature = "rocksdb")]
    if let Some(path) = url.strip_prefix("rocksdb://") {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("failed to create {}: {}", path, e)))?;
        return Ok(Arc::new(RocksDBStore::open(path)?));
    }

    Err(StoreError::UnsupportedUrl(url.to_string()))
}

use crate::storage_trait::{KvStore, StoreError};
use heirloom_types::{snapshot_key, BlockNumber, EntityType, Network, PairId, Snapshot};
use std::sync::Arc;
use tracing::warn;

/// Snapshot namespace of the shared store, keyed `{entity}:{network}:{id}`.
#[derive(Clone)]
pub struct SnapshotStore {
    kv: Arc<dyn KvStore>,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Replaces whatever was stored for the snapshot's identity.
    pub async fn put(&self, network: Network, snapshot: &Snapshot) -> Result<(), StoreError> {
        let value = snapshot.to_json()?;
        self.kv.set(&snapshot.key(network), &value).await
    }

    pub async fn get(
        &self,
        entity: EntityType,
        network: Network,
        id: &str,
    ) -> Result<Option<Snapshot>, StoreError> {
        match self.kv.get(&snapshot_key(entity, network, id)).await? {
            Some(raw) => Ok(Some(Snapshot::from_json(entity, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, pair: PairId) -> Result<usize, StoreError> {
        self.kv.delete_prefix(&pair.snapshot_prefix()).await
    }

    pub async fn keys(&self, pair: PairId) -> Result<Vec<String>, StoreError> {
        self.kv.list_keys(&pair.snapshot_prefix()).await
    }

    /// Raw stored values for a pair in key order. Keys that vanish between
    /// the listing and the read are skipped.
    pub async fn raw_values(&self, pair: PairId) -> Result<Vec<String>, StoreError> {
        let mut values = Vec::new();
        for key in self.keys(pair).await? {
            if let Some(value) = self.kv.get(&key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

/// Last fully processed block per pair, keyed `lastBlock:{entity}:{network}`.
#[derive(Clone)]
pub struct CheckpointStore {
    kv: Arc<dyn KvStore>,
}

impl CheckpointStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// An unparsable stored value reads as no checkpoint.
    pub async fn load(&self, pair: PairId) -> Result<Option<BlockNumber>, StoreError> {
        let key = pair.checkpoint_key();
        match self.kv.get(&key).await? {
            Some(raw) => match raw.trim().parse::<BlockNumber>() {
                Ok(height) => Ok(Some(height)),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring malformed checkpoint");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn save(&self, pair: PairId, height: BlockNumber) -> Result<(), StoreError> {
        self.kv.set(&pair.checkpoint_key(), &height.to_string()).await
    }
}

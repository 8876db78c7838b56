//! Shared, observable status of every watched pair.

use heirloom_types::{BlockNumber, PairId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BootstrapState {
    Pending,
    Complete { entries: usize },
    Incomplete { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunState {
    Starting,
    Tailing,
    Stopped { reason: String },
    /// Never started because the pair's configuration is unusable.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairStatus {
    pub bootstrap: BootstrapState,
    pub run: RunState,
    pub last_processed: Option<BlockNumber>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Default for PairStatus {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapState::Pending,
            run: RunState::Starting,
            last_processed: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Each pair only writes its own entry.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<BTreeMap<PairId, PairStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, pair: PairId) -> Option<PairStatus> {
        self.inner.read().await.get(&pair).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<PairId, PairStatus> {
        self.inner.read().await.clone()
    }

    /// Applies `f` to the pair's entry, creating a default one first.
    pub async fn update<F>(&self, pair: PairId, f: F)
    where
        F: FnOnce(&mut PairStatus),
    {
        let mut board = self.inner.write().await;
        f(board.entry(pair).or_default());
    }

    pub async fn set_run(&self, pair: PairId, run: RunState) {
        self.update(pair, |status| status.run = run).await;
    }

    pub async fn set_bootstrap(&self, pair: PairId, bootstrap: BootstrapState) {
        self.update(pair, |status| status.bootstrap = bootstrap).await;
    }

    pub async fn record_progress(&self, pair: PairId, last_processed: BlockNumber) {
        self.update(pair, |status| {
            status.last_processed = Some(last_processed);
            status.consecutive_failures = 0;
        })
        .await;
    }

    pub async fn record_failure(&self, pair: PairId, error: String, consecutive_failures: u32) {
        self.update(pair, |status| {
            status.last_error = Some(error);
            status.consecutive_failures = consecutive_failures;
        })
        .await;
    }
}

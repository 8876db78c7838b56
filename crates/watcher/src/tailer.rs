use crate::backoff::Backoff;
use crate::chain_client::ChainClient;
use crate::config::PairConfig;
use crate::error::WatchError;
use crate::indexer::EntityIndexer;
use crate::status::{RunState, StatusBoard};
use futures::FutureExt;
use heirloom_storage::{CheckpointStore, KvStore, SnapshotStore};
use heirloom_types::{BlockNumber, PairId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: BlockNumber,
    pub to: BlockNumber,
}

/// Confirmation-lag bookkeeping of one pair.
#[derive(Debug, Clone)]
pub struct TailState {
    last_processed: BlockNumber,
    confirmations: u64,
}

impl TailState {
    pub fn new(last_processed: BlockNumber, confirmations: u64) -> Self {
        Self {
            last_processed,
            confirmations,
        }
    }

    pub fn last_processed(&self) -> BlockNumber {
        self.last_processed
    }

    /// The range that becomes final once `head` is known, if any.
    pub fn plan(&self, head: BlockNumber) -> Option<BlockRange> {
        let safe = head.saturating_sub(self.confirmations);
        if safe <= self.last_processed {
            return None;
        }
        Some(BlockRange {
            from: self.last_processed + 1,
            to: safe,
        })
    }

    pub fn commit(&mut self, to: BlockNumber) {
        self.last_processed = self.last_processed.max(to);
    }
}

/// Single-slot mailbox holding only the newest head seen so far.
pub struct HeadMailbox {
    latest: watch::Receiver<Option<BlockNumber>>,
    forwarder: JoinHandle<()>,
}

impl HeadMailbox {
    pub fn spawn(mut heads: mpsc::Receiver<BlockNumber>) -> Self {
        let (tx, latest) = watch::channel(None);
        let forwarder = tokio::spawn(async move {
            while let Some(head) = heads.recv().await {
                tx.send_if_modified(|slot| {
                    if slot.map_or(true, |current| head > current) {
                        *slot = Some(head);
                        true
                    } else {
                        false
                    }
                });
            }
        });
        Self { latest, forwarder }
    }

    /// Waits for a head newer than the last one taken. `None` once the
    /// subscription is gone and nothing is left unread.
    pub async fn next(&mut self) -> Option<BlockNumber> {
        loop {
            self.latest.changed().await.ok()?;
            if let Some(head) = *self.latest.borrow_and_update() {
                return Some(head);
            }
        }
    }

    /// A head that arrived since the last take, without waiting.
    pub fn take_newer(&mut self) -> Option<BlockNumber> {
        match self.latest.changed().now_or_never() {
            Some(Ok(())) => *self.latest.borrow_and_update(),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.forwarder.is_finished()
    }
}

impl Drop for HeadMailbox {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Follows the chain for one pair, one confirmed range at a time.
pub struct Tailer {
    pair: PairId,
    indexer: Box<dyn EntityIndexer>,
    client: Arc<dyn ChainClient>,
    snapshots: SnapshotStore,
    checkpoints: CheckpointStore,
    status: StatusBoard,
    state: TailState,
    backoff: Backoff,
}

impl Tailer {
    pub fn new(
        config: &PairConfig,
        indexer: Box<dyn EntityIndexer>,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn KvStore>,
        status: StatusBoard,
        last_processed: BlockNumber,
    ) -> Self {
        Self {
            pair: config.pair,
            indexer,
            client,
            snapshots: SnapshotStore::new(store.clone()),
            checkpoints: CheckpointStore::new(store),
            status,
            state: TailState::new(last_processed, config.confirmations),
            backoff: Backoff::new(config.backoff),
        }
    }

    pub fn last_processed(&self) -> BlockNumber {
        self.state.last_processed()
    }

    /// Processes whatever `head` confirms. Returns the number of snapshots
    /// written, zero when nothing is final yet.
    pub async fn on_head(&mut self, head: BlockNumber) -> Result<usize, WatchError> {
        match self.state.plan(head) {
            Some(range) => self.process_range(range).await,
            None => {
                debug!(
                    entity = %self.pair.entity,
                    network = %self.pair.network,
                    head,
                    last_processed = self.state.last_processed(),
                    "nothing confirmed yet"
                );
                Ok(0)
            }
        }
    }

    /// Writes every affected snapshot, then advances the checkpoint. A failure
    /// anywhere leaves `last_processed` where it was.
    pub async fn process_range(&mut self, range: BlockRange) -> Result<usize, WatchError> {
        let collected = self
            .indexer
            .collect(self.client.as_ref(), range.from, range.to)
            .await?;

        for snapshot in &collected {
            self.snapshots.put(self.pair.network, snapshot).await?;
        }

        self.checkpoints.save(self.pair, range.to).await?;
        self.state.commit(range.to);
        self.status.record_progress(self.pair, self.state.last_processed()).await;

        info!(
            entity = %self.pair.entity,
            network = %self.pair.network,
            from = range.from,
            to = range.to,
            written = collected.len(),
            "processed range"
        );
        Ok(collected.len())
    }

    /// Consumes heads until the subscription ends, retrying failed ranges
    /// with backoff against the newest known head. Returns why it stopped.
    pub async fn run(mut self, mut mailbox: HeadMailbox) -> WatchError {
        self.status.set_run(self.pair, RunState::Tailing).await;

        while let Some(mut head) = mailbox.next().await {
            loop {
                match self.on_head(head).await {
                    Ok(_) => {
                        self.backoff.reset();
                        break;
                    }
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        warn!(
                            entity = %self.pair.entity,
                            network = %self.pair.network,
                            head,
                            failures = self.backoff.failures(),
                            "range failed, retrying in {:?}: {}",
                            delay,
                            e
                        );
                        self.status
                            .record_failure(self.pair, e.to_string(), self.backoff.failures())
                            .await;
                        sleep(delay).await;

                        match mailbox.take_newer() {
                            Some(newer) => head = head.max(newer),
                            None if mailbox.is_closed() => {
                                error!(
                                    entity = %self.pair.entity,
                                    network = %self.pair.network,
                                    "subscription closed while retrying"
                                );
                                return e;
                            }
                            None => {}
                        }
                    }
                }
            }
        }

        WatchError::Connection(format!("header subscription for {} closed", self.pair))
    }
}

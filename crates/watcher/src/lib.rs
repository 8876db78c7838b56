pub mod backoff;
pub mod bootstrap;
pub mod chain_client;
pub mod config;
pub mod contracts;
mod error;
pub mod heads;
pub mod indexer;
pub mod rpc_client;
pub mod status;
pub mod tailer;

pub use bootstrap::{reconcile, BootstrapReport, BootstrapSink};
pub use chain_client::{ChainClient, ChainConnector, EthChainClient, RpcConnector};
pub use config::{NetworkSelection, PairConfig, WatcherConfig};
pub use error::WatchError;
pub use rpc_client::{LogEntry, RpcClient};
pub use status::{BootstrapState, PairStatus, RunState, StatusBoard};
pub use tailer::{HeadMailbox, Tailer};

use heirloom_storage::{CheckpointStore, KvStore, SnapshotStore};
use heirloom_types::{BlockNumber, PairId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Runs one independent task per configured `(entity, network)` pair.
pub struct Watcher {
    config: WatcherConfig,
    store: Arc<dyn KvStore>,
    connector: Arc<dyn ChainConnector>,
    status: StatusBoard,
}

impl Watcher {
    pub fn new(config: WatcherConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            store,
            connector: Arc::new(RpcConnector),
            status: StatusBoard::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ChainConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Spawns every runnable pair. Pairs with unusable configuration are
    /// skipped; having none left is an error.
    pub async fn start(&self) -> Result<WatcherHandle, WatchError> {
        let mut tasks = Vec::new();

        for pair in self.config.pairs() {
            let pair_config = match self.config.pair_config(pair) {
                Ok(pair_config) => pair_config,
                Err(e) => {
                    warn!(entity = %pair.entity, network = %pair.network, "skipping pair: {}", e);
                    self.status
                        .set_run(pair, RunState::Skipped { reason: e.to_string() })
                        .await;
                    continue;
                }
            };

            let client = match self.connector.connect(&pair_config) {
                Ok(client) => client,
                Err(e) => {
                    error!(
                        entity = %pair.entity,
                        network = %pair.network,
                        "failed to create chain client: {}",
                        e
                    );
                    self.status
                        .set_run(pair, RunState::Skipped { reason: e.to_string() })
                        .await;
                    continue;
                }
            };

            self.status.set_run(pair, RunState::Starting).await;
            let task = tokio::spawn(run_pair(
                pair_config,
                client,
                self.store.clone(),
                self.status.clone(),
            ));
            tasks.push((pair, task));
        }

        if tasks.is_empty() {
            return Err(WatchError::Config(
                "no runnable (entity, network) pair is configured".to_string(),
            ));
        }

        info!(pairs = tasks.len(), "watcher started");
        Ok(WatcherHandle {
            status: self.status.clone(),
            tasks,
        })
    }
}

pub struct WatcherHandle {
    status: StatusBoard,
    tasks: Vec<(PairId, JoinHandle<()>)>,
}

impl WatcherHandle {
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn pairs(&self) -> Vec<PairId> {
        self.tasks.iter().map(|(pair, _)| *pair).collect()
    }

    /// Waits for every pair task to end. Pair tasks only end once their
    /// subscription is lost, or when aborted.
    pub async fn join(&mut self) {
        for (pair, task) in &mut self.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!(
                    entity = %pair.entity,
                    network = %pair.network,
                    "pair task panicked: {}",
                    e
                ),
            }
        }
    }

    pub fn abort(&self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

/// Lifecycle of one pair: initial height, bootstrap, subscription, tailing.
/// Every outcome lands in the status board; nothing propagates to other pairs.
async fn run_pair(
    config: PairConfig,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn KvStore>,
    status: StatusBoard,
) {
    let pair = config.pair;

    if let Err(e) = drive_pair(&config, client, store, &status).await {
        error!(entity = %pair.entity, network = %pair.network, "pair stopped: {}", e);
        status
            .update(pair, |entry| {
                entry.last_error = Some(e.to_string());
                entry.run = RunState::Stopped { reason: e.to_string() };
            })
            .await;
    }
}

async fn drive_pair(
    config: &PairConfig,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn KvStore>,
    status: &StatusBoard,
) -> Result<(), WatchError> {
    let pair = config.pair;
    let checkpoints = CheckpointStore::new(store.clone());

    let last_processed = initial_height(config, client.as_ref(), &checkpoints).await?;
    status
        .update(pair, |entry| entry.last_processed = Some(last_processed))
        .await;
    info!(entity = %pair.entity, network = %pair.network, last_processed, "pair starting");

    let indexer = indexer::indexer_for(
        pair.entity,
        config.contract,
        config.log_chunk_size,
        config.bootstrap_page_size,
    );

    let report = reconcile(
        pair,
        indexer.as_ref(),
        client.as_ref(),
        &SnapshotStore::new(store.clone()),
    )
    .await;
    let bootstrap = match &report.error {
        None => BootstrapState::Complete {
            entries: report.written,
        },
        Some(e) => BootstrapState::Incomplete {
            reason: e.to_string(),
        },
    };
    status.set_bootstrap(pair, bootstrap).await;

    let heads = client.subscribe_new_blocks().await?;
    let mailbox = HeadMailbox::spawn(heads);

    let tailer = Tailer::new(config, indexer, client, store, status.clone(), last_processed);
    Err(tailer.run(mailbox).await)
}

/// Stored checkpoint when resuming, else the configured start block, else
/// the current head.
async fn initial_height(
    config: &PairConfig,
    client: &dyn ChainClient,
    checkpoints: &CheckpointStore,
) -> Result<BlockNumber, WatchError> {
    if config.resume_from_checkpoint {
        if let Some(height) = checkpoints.load(config.pair).await? {
            return Ok(height);
        }
    }
    match config.start_block {
        Some(height) => Ok(height),
        None => client.current_height().await,
    }
}

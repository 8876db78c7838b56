use crate::chain_client::ChainClient;
use crate::error::WatchError;
use crate::indexer::EntityIndexer;
use heirloom_storage::SnapshotStore;
use heirloom_types::{Network, PairId, Snapshot};
use tracing::{error, info};

/// Outcome of one reconciliation. `error` is set when the rebuild stopped
/// early; whatever was written before the failure stays in the store.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub cleared: usize,
    pub written: usize,
    pub error: Option<WatchError>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Destination of bulk-read rows. Each row is stored on arrival.
pub struct BootstrapSink<'a> {
    network: Network,
    snapshots: &'a SnapshotStore,
    written: usize,
}

impl<'a> BootstrapSink<'a> {
    pub fn new(network: Network, snapshots: &'a SnapshotStore) -> Self {
        Self {
            network,
            snapshots,
            written: 0,
        }
    }

    pub async fn write(&mut self, snapshot: Snapshot) -> Result<(), WatchError> {
        self.snapshots.put(self.network, &snapshot).await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Drops every snapshot of the pair and rebuilds them from a bulk read of the
/// contract. Never touches the checkpoint.
pub async fn reconcile(
    pair: PairId,
    indexer: &dyn EntityIndexer,
    client: &dyn ChainClient,
    snapshots: &SnapshotStore,
) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    match snapshots.clear(pair).await {
        Ok(cleared) => report.cleared = cleared,
        Err(e) => {
            error!(
                entity = %pair.entity,
                network = %pair.network,
                "failed to clear snapshots: {}",
                e
            );
            report.error = Some(e.into());
            return report;
        }
    }

    let mut sink = BootstrapSink::new(pair.network, snapshots);
    let outcome = indexer.bootstrap(client, &mut sink).await;
    report.written = sink.written();

    if let Err(e) = outcome {
        error!(
            entity = %pair.entity,
            network = %pair.network,
            written = report.written,
            "bootstrap stopped early: {}",
            e
        );
        report.error = Some(e);
        return report;
    }

    info!(
        entity = %pair.entity,
        network = %pair.network,
        cleared = report.cleared,
        written = report.written,
        "bootstrap complete"
    );
    report
}

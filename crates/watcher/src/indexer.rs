use crate::bootstrap::BootstrapSink;
use crate::chain_client::{call_contract, get_logs_chunked, ChainClient};
use crate::contracts::{self, Attesters, Claims, Safes};
use crate::error::WatchError;
use crate::rpc_client::LogEntry;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use heirloom_types::{ClaimId, EntityType, Snapshot};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Turns one contract's on-chain state into snapshots.
#[async_trait]
pub trait EntityIndexer: Send + Sync {
    /// Reads every current row in bulk, handing each to `sink` as soon as it
    /// is read. Rows stored before an error stay stored.
    async fn bootstrap(
        &self,
        client: &dyn ChainClient,
        sink: &mut BootstrapSink<'_>,
    ) -> Result<(), WatchError>;

    /// Snapshots of every record touched by events in `[from, to]`, at most
    /// one per entity id.
    async fn collect(
        &self,
        client: &dyn ChainClient,
        from: u64,
        to: u64,
    ) -> Result<Vec<Snapshot>, WatchError>;
}

pub fn indexer_for(
    entity: EntityType,
    contract: Address,
    log_chunk_size: u64,
    bootstrap_page_size: u64,
) -> Box<dyn EntityIndexer> {
    match entity {
        EntityType::Attester => Box::new(AttesterIndexer {
            contract,
            log_chunk_size,
            page_size: bootstrap_page_size,
        }),
        EntityType::Safe => Box::new(SafeIndexer {
            contract,
            log_chunk_size,
        }),
        EntityType::Claim => Box::new(ClaimIndexer {
            contract,
            log_chunk_size,
        }),
    }
}

/// The upsert event carries the full record, so snapshots come straight from
/// log payloads.
pub struct AttesterIndexer {
    contract: Address,
    log_chunk_size: u64,
    page_size: u64,
}

#[async_trait]
impl EntityIndexer for AttesterIndexer {
    async fn bootstrap(
        &self,
        client: &dyn ChainClient,
        sink: &mut BootstrapSink<'_>,
    ) -> Result<(), WatchError> {
        let call = Attesters::getAttestersCall {
            offset: U256::ZERO,
            max: U256::from(self.page_size),
        };
        let page = call_contract(client, self.contract, &call, None).await?;

        for record in contracts::attesters_from_page(page) {
            sink.write(Snapshot::Attester(record)).await?;
        }
        Ok(())
    }

    async fn collect(
        &self,
        client: &dyn ChainClient,
        from: u64,
        to: u64,
    ) -> Result<Vec<Snapshot>, WatchError> {
        let logs = get_logs_chunked(
            client,
            self.contract,
            Attesters::AttesterUpserted::SIGNATURE_HASH,
            from,
            to,
            self.log_chunk_size,
        )
        .await?;

        // Logs are ascending, so the last upsert per address wins.
        let mut latest = BTreeMap::new();
        for log in &logs {
            let topics = log.topics.iter().copied();
            match Attesters::AttesterUpserted::decode_raw_log(topics, &log.data, true) {
                Ok(event) => {
                    let record = contracts::attester_from_event(&event, log);
                    latest.insert(record.address.clone(), record);
                }
                Err(e) => {
                    warn!(
                        block = log.block_number,
                        log_index = log.log_index,
                        "skipping undecodable AttesterUpserted log: {}",
                        e
                    );
                }
            }
        }

        Ok(latest.into_values().map(Snapshot::Attester).collect())
    }
}

/// Insert and update events are consolidated per id and re-read from the
/// contract.
pub struct SafeIndexer {
    contract: Address,
    log_chunk_size: u64,
}

impl SafeIndexer {
    const EVENTS: [B256; 2] = [
        Safes::RowInserted::SIGNATURE_HASH,
        Safes::RowUpdated::SIGNATURE_HASH,
    ];

    async fn read(
        &self,
        client: &dyn ChainClient,
        id: B256,
        at: Option<u64>,
    ) -> Result<Snapshot, WatchError> {
        let row = call_contract(client, self.contract, &Safes::getCall { id }, at).await?;
        let phones_call = Safes::getEncryptedPhonesCall { id };
        let phones = call_contract(client, self.contract, &phones_call, at).await?._0;
        Ok(Snapshot::Safe(contracts::safe_record(id, row, &phones)))
    }
}

#[async_trait]
impl EntityIndexer for SafeIndexer {
    async fn bootstrap(
        &self,
        client: &dyn ChainClient,
        sink: &mut BootstrapSink<'_>,
    ) -> Result<(), WatchError> {
        let count = call_contract(client, self.contract, &Safes::idsLengthCall {}, None)
            .await?
            ._0;
        let count = u64::try_from(count)
            .map_err(|_| WatchError::Call(format!("safe count {} out of range", count)))?;
        debug!(count, "repopulating safes");

        for index in 0..count {
            let id = call_contract(
                client,
                self.contract,
                &Safes::idsCall {
                    index: U256::from(index),
                },
                None,
            )
            .await?
            ._0;
            sink.write(self.read(client, id, None).await?).await?;
        }
        Ok(())
    }

    async fn collect(
        &self,
        client: &dyn ChainClient,
        from: u64,
        to: u64,
    ) -> Result<Vec<Snapshot>, WatchError> {
        let mut affected = BTreeSet::new();
        for event in Self::EVENTS {
            let chunk = self.log_chunk_size;
            let logs = get_logs_chunked(client, self.contract, event, from, to, chunk).await?;
            affected.extend(logs.iter().filter_map(indexed_id));
        }

        let mut snapshots = Vec::with_capacity(affected.len());
        for id in affected {
            snapshots.push(self.read(client, id, Some(to)).await?);
        }
        Ok(snapshots)
    }
}

/// Creation, status, phone and attestor events all touch the same claim, so
/// affected ids are re-read once each.
pub struct ClaimIndexer {
    contract: Address,
    log_chunk_size: u64,
}

impl ClaimIndexer {
    const EVENTS: [B256; 4] = [
        Claims::ClaimCreated::SIGNATURE_HASH,
        Claims::StatusChanged::SIGNATURE_HASH,
        Claims::PhoneUpdated::SIGNATURE_HASH,
        Claims::AttestorUpdated::SIGNATURE_HASH,
    ];

    async fn read(
        &self,
        client: &dyn ChainClient,
        id: ClaimId,
        at: Option<u64>,
    ) -> Result<Snapshot, WatchError> {
        let row = call_contract(
            client,
            self.contract,
            &Claims::getClaimCall { id: U256::from(id) },
            at,
        )
        .await?;
        Ok(Snapshot::Claim(contracts::claim_record(id, row)))
    }
}

#[async_trait]
impl EntityIndexer for ClaimIndexer {
    async fn bootstrap(
        &self,
        client: &dyn ChainClient,
        sink: &mut BootstrapSink<'_>,
    ) -> Result<(), WatchError> {
        let count = call_contract(client, self.contract, &Claims::idsLengthCall {}, None)
            .await?
            ._0;
        let count = u64::try_from(count)
            .map_err(|_| WatchError::Call(format!("claim count {} out of range", count)))?;
        debug!(count, "repopulating claims");

        for index in 0..count {
            let id = call_contract(
                client,
                self.contract,
                &Claims::idsCall {
                    index: U256::from(index),
                },
                None,
            )
            .await?
            ._0;
            sink.write(self.read(client, claim_id(id)?, None).await?).await?;
        }
        Ok(())
    }

    async fn collect(
        &self,
        client: &dyn ChainClient,
        from: u64,
        to: u64,
    ) -> Result<Vec<Snapshot>, WatchError> {
        let mut affected = BTreeSet::new();
        for event in Self::EVENTS {
            let chunk = self.log_chunk_size;
            let logs = get_logs_chunked(client, self.contract, event, from, to, chunk).await?;
            for topic in logs.iter().filter_map(indexed_id) {
                affected.insert(claim_id(U256::from_be_bytes(topic.0))?);
            }
        }

        let mut snapshots = Vec::with_capacity(affected.len());
        for id in affected {
            snapshots.push(self.read(client, id, Some(to)).await?);
        }
        Ok(snapshots)
    }
}

/// First indexed argument of a log. Every watched event indexes the record id
/// there.
fn indexed_id(log: &LogEntry) -> Option<B256> {
    let id = log.topics.get(1).copied();
    if id.is_none() {
        warn!(
            block = log.block_number,
            log_index = log.log_index,
            "skipping log without an indexed id"
        );
    }
    id
}

fn claim_id(id: U256) -> Result<ClaimId, WatchError> {
    u64::try_from(id).map_err(|_| WatchError::Call(format!("claim id {} out of range", id)))
}

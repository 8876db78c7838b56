// Scripted in-process chain for driving indexers, tailers and the watcher
// without a node.

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use heirloom_types::PairId;
use heirloom_watcher::config::PairConfig;
use heirloom_watcher::contracts::{Attesters, Claims, Safes};
use heirloom_watcher::{ChainClient, ChainConnector, LogEntry, WatchError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct MockChain {
    height: Mutex<u64>,
    logs: Mutex<Vec<LogEntry>>,
    calls: Mutex<HashMap<(Address, Vec<u8>), Bytes>>,
    call_heights: Mutex<Vec<(Vec<u8>, Option<u64>)>>,
    log_requests: Mutex<Vec<(B256, u64, u64)>>,
    failing_log_requests: AtomicUsize,
    down: AtomicBool,
    head_tx: Mutex<Option<mpsc::Sender<u64>>>,
    head_rx: Mutex<Option<mpsc::Receiver<u64>>>,
}

impl MockChain {
    pub fn new(height: u64) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(64);
        Arc::new(Self {
            height: Mutex::new(height),
            logs: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
            call_heights: Mutex::new(Vec::new()),
            log_requests: Mutex::new(Vec::new()),
            failing_log_requests: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            head_tx: Mutex::new(Some(tx)),
            head_rx: Mutex::new(Some(rx)),
        })
    }

    /// A chain whose node never answers.
    pub fn unreachable() -> Arc<Self> {
        let chain = Self::new(0);
        chain.down.store(true, Ordering::SeqCst);
        chain
    }

    pub fn push_log(
        &self,
        address: Address,
        topics: Vec<B256>,
        data: Vec<u8>,
        block: u64,
        index: u64,
    ) {
        self.logs.lock().unwrap().push(LogEntry {
            address,
            topics,
            data: Bytes::from(data),
            block_number: block,
            log_index: index,
            transaction_hash: Some(B256::with_last_byte(block as u8)),
        });
    }

    pub fn respond<C: SolCall>(&self, address: Address, call: &C, output: Vec<u8>) {
        self.calls
            .lock()
            .unwrap()
            .insert((address, call.abi_encode()), Bytes::from(output));
    }

    pub fn call_count<C: SolCall>(&self, call: &C) -> usize {
        self.call_heights(call).len()
    }

    /// Block each execution of `call` was pinned to, in call order.
    pub fn call_heights<C: SolCall>(&self, call: &C) -> Vec<Option<u64>> {
        let calldata = call.abi_encode();
        self.call_heights
            .lock()
            .unwrap()
            .iter()
            .filter(|(data, _)| *data == calldata)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn log_requests(&self) -> Vec<(B256, u64, u64)> {
        self.log_requests.lock().unwrap().clone()
    }

    pub fn fail_next_log_requests(&self, count: usize) {
        self.failing_log_requests.store(count, Ordering::SeqCst);
    }

    pub async fn send_head(&self, head: u64) {
        *self.height.lock().unwrap() = head;
        let tx = self.head_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(head).await.unwrap();
        }
    }

    pub fn close_heads(&self) {
        self.head_tx.lock().unwrap().take();
    }

    fn check_up(&self) -> Result<(), WatchError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(WatchError::Connection("node unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_height(&self) -> Result<u64, WatchError> {
        self.check_up()?;
        Ok(*self.height.lock().unwrap())
    }

    async fn get_logs(
        &self,
        address: Address,
        event: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, WatchError> {
        self.check_up()?;
        if self
            .failing_log_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(WatchError::Connection("eth_getLogs timed out".to_string()));
        }
        self.log_requests.lock().unwrap().push((event, from, to));

        let mut logs: Vec<LogEntry> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.address == address
                    && log.topics.first() == Some(&event)
                    && (from..=to).contains(&log.block_number)
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(
        &self,
        address: Address,
        calldata: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Bytes, WatchError> {
        self.check_up()?;
        self.call_heights.lock().unwrap().push((calldata.clone(), at));
        self.calls
            .lock()
            .unwrap()
            .get(&(address, calldata))
            .cloned()
            .ok_or_else(|| WatchError::Call("execution reverted".to_string()))
    }

    async fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<u64>, WatchError> {
        self.check_up()?;
        self.head_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| WatchError::Connection("already subscribed".to_string()))
    }
}

/// Hands out a pre-built mock chain per pair.
#[derive(Default)]
pub struct MockConnector {
    chains: HashMap<PairId, Arc<MockChain>>,
}

impl MockConnector {
    pub fn with(mut self, pair: PairId, chain: Arc<MockChain>) -> Self {
        self.chains.insert(pair, chain);
        self
    }
}

impl ChainConnector for MockConnector {
    fn connect(&self, config: &PairConfig) -> Result<Arc<dyn ChainClient>, WatchError> {
        self.chains
            .get(&config.pair)
            .cloned()
            .map(|chain| chain as Arc<dyn ChainClient>)
            .ok_or_else(|| WatchError::Connection(format!("no chain for {}", config.pair)))
    }
}

pub fn word(value: u64) -> B256 {
    B256::from(U256::from(value).to_be_bytes::<32>())
}

pub fn attester_upserted(
    chain: &MockChain,
    contract: Address,
    attester: Address,
    name: &str,
    updated_at: u64,
    block: u64,
    index: u64,
) {
    let event = Attesters::AttesterUpserted {
        attester,
        publicKey: format!("pk-{}", name),
        name: name.to_string(),
        meta: "{}".to_string(),
        updatedAt: updated_at,
    };
    chain.push_log(
        contract,
        vec![Attesters::AttesterUpserted::SIGNATURE_HASH, attester.into_word()],
        event.encode_data(),
        block,
        index,
    );
}

pub fn attester_page(
    chain: &MockChain,
    contract: Address,
    page_size: u64,
    wallets: Vec<(Address, &str)>,
) {
    let names: Vec<String> = wallets.iter().map(|(_, name)| name.to_string()).collect();
    let keys: Vec<String> = names.iter().map(|name| format!("pk-{}", name)).collect();
    let metas: Vec<String> = names.iter().map(|_| "{}".to_string()).collect();
    let updated: Vec<u64> = names.iter().map(|_| 1u64).collect();
    let flags: Vec<bool> = names.iter().map(|_| true).collect();
    let slashed: Vec<bool> = names.iter().map(|_| false).collect();
    let addresses: Vec<Address> = wallets.iter().map(|(address, _)| *address).collect();

    chain.respond(
        contract,
        &Attesters::getAttestersCall {
            offset: U256::ZERO,
            max: U256::from(page_size),
        },
        Attesters::getAttestersCall::abi_encode_returns(&(
            addresses, keys, names, metas, updated, flags, slashed,
        )),
    );
}

pub fn claim_event(
    chain: &MockChain,
    contract: Address,
    signature: B256,
    id: u64,
    block: u64,
    index: u64,
) {
    chain.push_log(contract, vec![signature, word(id)], Vec::new(), block, index);
}

pub fn claim_row(chain: &MockChain, contract: Address, id: u64, claimer: Address, status: u8) {
    chain.respond(
        contract,
        &Claims::getClaimCall { id: U256::from(id) },
        Claims::getClaimCall::abi_encode_returns(&(
            claimer,
            Address::repeat_byte(0x5a),
            Address::repeat_byte(0xa7),
            "enc-phone".to_string(),
            1_720_000_000u64,
            status,
        )),
    );
}

pub fn claim_ids(chain: &MockChain, contract: Address, ids: &[u64]) {
    chain.respond(
        contract,
        &Claims::idsLengthCall {},
        Claims::idsLengthCall::abi_encode_returns(&(U256::from(ids.len()),)),
    );
    for (index, id) in ids.iter().enumerate() {
        chain.respond(
            contract,
            &Claims::idsCall {
                index: U256::from(index),
            },
            Claims::idsCall::abi_encode_returns(&(U256::from(*id),)),
        );
    }
}

pub fn safe_event(
    chain: &MockChain,
    contract: Address,
    signature: B256,
    id: B256,
    block: u64,
    index: u64,
) {
    chain.push_log(contract, vec![signature, id], Vec::new(), block, index);
}

pub fn safe_row(
    chain: &MockChain,
    contract: Address,
    id: B256,
    waiting_period: u8,
    phones: Vec<Bytes>,
) {
    chain.respond(
        contract,
        &Safes::getCall { id },
        Safes::getCall::abi_encode_returns(&(
            Address::repeat_byte(0x11),
            waiting_period,
            false,
            vec![Address::repeat_byte(0x22)],
            1_720_000_000u64,
        )),
    );
    chain.respond(
        contract,
        &Safes::getEncryptedPhonesCall { id },
        Safes::getEncryptedPhonesCall::abi_encode_returns(&(phones,)),
    );
}

pub fn safe_ids(chain: &MockChain, contract: Address, ids: &[B256]) {
    chain.respond(
        contract,
        &Safes::idsLengthCall {},
        Safes::idsLengthCall::abi_encode_returns(&(U256::from(ids.len()),)),
    );
    for (index, id) in ids.iter().enumerate() {
        chain.respond(
            contract,
            &Safes::idsCall {
                index: U256::from(index),
            },
            Safes::idsCall::abi_encode_returns(&(*id,)),
        );
    }
}

/// Polls `check` until it holds or a few seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

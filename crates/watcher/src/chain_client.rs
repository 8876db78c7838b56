use crate::config::PairConfig;
use crate::error::WatchError;
use crate::heads;
use crate::rpc_client::{LogEntry, RpcClient};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const HEAD_CHANNEL_CAPACITY: usize = 16;

/// Everything a pair needs from its node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_height(&self) -> Result<u64, WatchError>;

    /// Logs emitted by `address` with first topic `event` in the inclusive
    /// range, ascending by `(block_number, log_index)`. Wide ranges may be
    /// rejected by the node; use [`get_logs_chunked`].
    async fn get_logs(
        &self,
        address: Address,
        event: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, WatchError>;

    /// Read-only call returning the raw ABI-encoded output.
    async fn call(
        &self,
        address: Address,
        calldata: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Bytes, WatchError>;

    /// Block numbers of new headers in arrival order. The receiver closing
    /// means the connection is gone.
    async fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<u64>, WatchError>;
}

/// Creates the chain client for a pair.
pub trait ChainConnector: Send + Sync {
    fn connect(&self, config: &PairConfig) -> Result<Arc<dyn ChainClient>, WatchError>;
}

/// Connects pairs to their configured JSON-RPC node.
pub struct RpcConnector;

impl ChainConnector for RpcConnector {
    fn connect(&self, config: &PairConfig) -> Result<Arc<dyn ChainClient>, WatchError> {
        Ok(Arc::new(EthChainClient::new(config)?))
    }
}

pub struct EthChainClient {
    rpc: Arc<RpcClient>,
    ws_url: Option<String>,
    poll_interval: Duration,
}

impl EthChainClient {
    pub fn new(config: &PairConfig) -> Result<Self, WatchError> {
        Ok(Self {
            rpc: Arc::new(RpcClient::new(config.rpc_url.clone(), &config.rpc)?),
            ws_url: config.ws_url.clone(),
            poll_interval: Duration::from_secs(config.rpc.poll_interval_seconds.max(1)),
        })
    }
}

#[async_trait]
impl ChainClient for EthChainClient {
    async fn current_height(&self) -> Result<u64, WatchError> {
        self.rpc.get_block_number().await
    }

    async fn get_logs(
        &self,
        address: Address,
        event: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<LogEntry>, WatchError> {
        self.rpc.get_logs(address, event, from, to).await
    }

    async fn call(
        &self,
        address: Address,
        calldata: Vec<u8>,
        at: Option<u64>,
    ) -> Result<Bytes, WatchError> {
        self.rpc.eth_call(address, &calldata, at).await
    }

    async fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<u64>, WatchError> {
        let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
        match &self.ws_url {
            Some(url) => {
                heads::subscribe_ws(url, tx).await?;
            }
            None => {
                heads::poll_heads(self.rpc.clone(), self.poll_interval, tx);
            }
        }
        Ok(rx)
    }
}

/// Splits `[from, to]` into consecutive inclusive chunks of at most `size`
/// blocks with no gaps or overlaps.
pub fn block_chunks(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

pub async fn get_logs_chunked(
    client: &dyn ChainClient,
    address: Address,
    event: B256,
    from: u64,
    to: u64,
    chunk_size: u64,
) -> Result<Vec<LogEntry>, WatchError> {
    let mut logs = Vec::new();
    for (start, end) in block_chunks(from, to, chunk_size) {
        logs.extend(client.get_logs(address, event, start, end).await?);
    }
    Ok(logs)
}

/// Encodes `call`, executes it and decodes the typed return value.
pub async fn call_contract<C>(
    client: &dyn ChainClient,
    address: Address,
    call: &C,
    at: Option<u64>,
) -> Result<C::Return, WatchError>
where
    C: SolCall + Sync,
{
    let output = client.call(address, call.abi_encode(), at).await?;
    C::abi_decode_returns(&output, true)
        .map_err(|e| WatchError::Call(format!("failed to decode {} output: {}", C::SIGNATURE, e)))
}

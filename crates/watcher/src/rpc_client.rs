use crate::config::RpcSettings;
use crate::error::WatchError;
use alloy_primitives::{Address, Bytes, B256};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One `eth_getLogs` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(deserialize_with = "quantity")]
    pub block_number: u64,
    #[serde(deserialize_with = "quantity")]
    pub log_index: u64,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

pub fn parse_quantity(hex_str: &str) -> Result<u64, WatchError> {
    u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
        .map_err(|e| WatchError::Call(format!("failed to parse quantity {}: {}", hex_str, e)))
}

fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_quantity(&raw).map_err(serde::de::Error::custom)
}

/// JSON-RPC over HTTP, or over a WebSocket for `ws://` and `wss://` URLs,
/// with linear retry on transport failures and rate limits.
pub struct RpcClient {
    transport: Transport,
    url: String,
    max_retries: u32,
    retry_delay: Duration,
}

enum Transport {
    Http(reqwest::Client),
    Ws(WsTransport),
}

impl RpcClient {
    pub fn new(url: impl Into<String>, settings: &RpcSettings) -> Result<Self, WatchError> {
        let url = url.into();
        let request_timeout = Duration::from_secs(settings.timeout_seconds);

        let transport = if is_websocket_url(&url) {
            Transport::Ws(WsTransport::new(request_timeout))
        } else {
            let client = reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .map_err(|e| WatchError::Config(format!("cannot build HTTP client: {}", e)))?;
            Transport::Http(client)
        };

        Ok(Self {
            transport,
            url,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_secs(settings.retry_delay_seconds),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, WatchError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let mut attempt = 0;
        loop {
            match self.try_call(&payload).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(method, attempt, "RPC call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(RpcFailure::Fatal(e)) => return Err(e),
                Err(RpcFailure::Retryable(e)) => {
                    if attempt >= self.max_retries {
                        error!(method, retries = self.max_retries, "RPC call failed: {}", e);
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.retry_delay * attempt;
                    warn!(
                        method,
                        attempt,
                        max = self.max_retries,
                        "RPC call failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn try_call(&self, payload: &Value) -> Result<Value, RpcFailure> {
        let response = match &self.transport {
            Transport::Http(client) => {
                let response = client
                    .post(&self.url)
                    .json(payload)
                    .send()
                    .await
                    .map_err(|e| RpcFailure::Retryable(WatchError::Connection(e.to_string())))?;
                response.json::<Value>().await.map_err(|e| {
                    RpcFailure::Retryable(WatchError::Connection(format!(
                        "invalid response body: {}",
                        e
                    )))
                })?
            }
            Transport::Ws(ws) => ws
                .request(&self.url, payload)
                .await
                .map_err(RpcFailure::Retryable)?,
        };

        let method = payload.get("method").and_then(|v| v.as_str()).unwrap_or("request");
        into_result(method, response)
    }

    pub async fn get_block_number(&self) -> Result<u64, WatchError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| WatchError::Call("eth_blockNumber result is not a string".to_string()))?;

        parse_quantity(hex_str)
    }

    /// Logs of `address` whose first topic is `event`, ascending by
    /// `(block_number, log_index)`.
    pub async fn get_logs(
        &self,
        address: Address,
        event: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, WatchError> {
        let params = serde_json::json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": address,
            "topics": [event]
        }]);

        let result = self.call("eth_getLogs", params).await?;

        let mut logs: Vec<LogEntry> = serde_json::from_value(result)
            .map_err(|e| WatchError::Call(format!("malformed eth_getLogs result: {}", e)))?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        Ok(logs)
    }

    /// `eth_call` at block `at`, or at the latest block.
    pub async fn eth_call(
        &self,
        to: Address,
        data: &[u8],
        at: Option<u64>,
    ) -> Result<Bytes, WatchError> {
        let block = match at {
            Some(height) => format!("0x{:x}", height),
            None => "latest".to_string(),
        };
        let params = serde_json::json!([
            {
                "to": to,
                "data": format!("0x{}", hex::encode(data))
            },
            block
        ]);

        let result = self.call("eth_call", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| WatchError::Call("eth_call result is not a string".to_string()))?;

        hex::decode(hex_str.trim_start_matches("0x"))
            .map(Bytes::from)
            .map_err(|e| WatchError::Call(format!("failed to decode eth_call result: {}", e)))
    }
}

enum RpcFailure {
    Retryable(WatchError),
    Fatal(WatchError),
}

fn into_result(method: &str, response: Value) -> Result<Value, RpcFailure> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("no message");

        // -32005 is the provider limit code some nodes use instead of 429
        return Err(if matches!(code, -32005 | 429) {
            RpcFailure::Retryable(WatchError::Connection(format!(
                "{} throttled by node: {}",
                method, message
            )))
        } else {
            RpcFailure::Fatal(WatchError::Call(format!(
                "{} failed with code {}: {}",
                method, code, message
            )))
        });
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| RpcFailure::Fatal(WatchError::Call("response has no result".to_string())))
}

fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

/// One request at a time over a lazily opened socket. A failed or timed out
/// exchange drops the socket, so the next attempt reconnects.
struct WsTransport {
    timeout: Duration,
    next_id: AtomicU64,
    socket: Mutex<Option<WsStream>>,
}

impl WsTransport {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_id: AtomicU64::new(1),
            socket: Mutex::new(None),
        }
    }

    async fn request(&self, url: &str, payload: &Value) -> Result<Value, WatchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = payload.clone();
        request["id"] = Value::from(id);
        let request = request.to_string();

        let mut slot = self.socket.lock().await;
        let exchange = async {
            let mut stream = match slot.take() {
                Some(stream) => stream,
                None => {
                    let (stream, _) = connect_async(url).await.map_err(|e| {
                        WatchError::Connection(format!("rpc socket {} unreachable: {}", url, e))
                    })?;
                    stream
                }
            };
            let response = ws_exchange(&mut stream, request, id).await?;
            *slot = Some(stream);
            Ok::<_, WatchError>(response)
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| WatchError::Connection(format!("request to {} timed out", url)))?
    }
}

/// Sends `request` and waits for the frame answering `id`, skipping anything
/// else the node pushes meanwhile.
async fn ws_exchange(stream: &mut WsStream, request: String, id: u64) -> Result<Value, WatchError> {
    let broken = |e: tokio_tungstenite::tungstenite::Error| WatchError::Connection(e.to_string());

    stream.send(Message::Text(request)).await.map_err(broken)?;

    while let Some(message) = stream.next().await {
        match message.map_err(broken)? {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(&text).map_err(|e| {
                    WatchError::Connection(format!("malformed websocket frame: {}", e))
                })?;
                if value.get("id").and_then(Value::as_u64) == Some(id) {
                    return Ok(value);
                }
            }
            Message::Ping(payload) => stream.send(Message::Pong(payload)).await.map_err(broken)?,
            Message::Close(frame) => {
                return Err(WatchError::Connection(format!(
                    "websocket closed by node: {:?}",
                    frame
                )))
            }
            _ => {}
        }
    }
    Err(WatchError::Connection("websocket stream ended".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn deserializes_rpc_log() {
        let raw = serde_json::json!({
            "address": "0xd40c18effd79d28d16ffbebb8cb059825376da7d",
            "topics": [
                "0x0000000000000000000000000000000000000000000000000000000000000001"
            ],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
            "transactionIndex": "0x0",
            "blockHash": "0x00000000000000000000000000000000000000000000000000000000000000bb",
            "logIndex": "0x2",
            "removed": false
        });

        let log: LogEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(log.block_number, 16);
        assert_eq!(log.log_index, 2);
        assert_eq!(log.topics.len(), 1);
        assert!(log.data.is_empty());
        assert!(log.transaction_hash.is_some());
    }

    #[test]
    fn node_errors_are_split_into_retryable_and_fatal() {
        let throttled = serde_json::json!({
            "id": 1,
            "error": {"code": 429, "message": "slow down"}
        });
        assert!(matches!(
            into_result("eth_getLogs", throttled),
            Err(RpcFailure::Retryable(WatchError::Connection(_)))
        ));

        let reverted = serde_json::json!({
            "id": 1,
            "error": {"code": 3, "message": "execution reverted"}
        });
        match into_result("eth_call", reverted) {
            Err(RpcFailure::Fatal(WatchError::Call(message))) => {
                assert_eq!(message, "eth_call failed with code 3: execution reverted")
            }
            _ => panic!("revert should be fatal"),
        }
    }

    #[tokio::test]
    async fn websocket_transport_matches_responses_by_id() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            for _ in 0..2 {
                let request = match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => serde_json::from_str::<Value>(&text).unwrap(),
                    other => panic!("unexpected frame {:?}", other),
                };
                assert_eq!(request["method"], "eth_blockNumber");
                let id = request["id"].as_u64().unwrap();

                let unrelated =
                    serde_json::json!({"jsonrpc": "2.0", "id": id + 100, "result": "0x1"});
                ws.send(Message::Text(unrelated.to_string())).await.unwrap();
                let height = format!("0x{:x}", 16 + id);
                let answer = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": height});
                ws.send(Message::Text(answer.to_string())).await.unwrap();
            }
        });

        let rpc = RpcClient::new(format!("ws://{}", addr), &RpcSettings::default()).unwrap();
        assert_eq!(rpc.get_block_number().await.unwrap(), 17);
        assert_eq!(rpc.get_block_number().await.unwrap(), 18);
        node.await.unwrap();
    }
}

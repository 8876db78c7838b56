//! New block header sources feeding a pair's tailer.
//!
//! Both sources end by dropping their sender, which the tailer observes as a
//! closed subscription.

use crate::error::WatchError;
use crate::rpc_client::{parse_quantity, RpcClient};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Opens an `eth_subscribe("newHeads")` subscription and forwards every header
/// number. Connection failures are reported before any task is spawned.
pub async fn subscribe_ws(
    url: &str,
    heads: mpsc::Sender<u64>,
) -> Result<JoinHandle<()>, WatchError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| {
            WatchError::Connection(format!("websocket connect to {} failed: {}", url, e))
        })?;

    let (mut sink, mut stream) = ws_stream.split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"]
    })
    .to_string();

    sink.send(Message::Text(request))
        .await
        .map_err(|e| WatchError::Connection(format!("failed to send eth_subscribe: {}", e)))?;

    info!(url, "subscribed to new block headers");

    let url = url.to_string();
    Ok(tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => match header_number(&text) {
                    Ok(Some(number)) => {
                        if heads.send(number).await.is_err() {
                            debug!(url = %url, "header receiver dropped");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(url = %url, "header subscription rejected: {}", e);
                        return;
                    }
                },
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        error!(url = %url, "failed to answer websocket ping: {}", e);
                        return;
                    }
                }
                Ok(Message::Close(frame)) => {
                    error!(url = %url, ?frame, "websocket closed by node");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(url = %url, "websocket error: {}", e);
                    return;
                }
            }
        }
        error!(url = %url, "websocket stream ended");
    }))
}

/// Extracts the block number from a subscription notification. Returns
/// `Ok(None)` for frames that carry no header, such as the subscription ack.
pub fn header_number(frame: &str) -> Result<Option<u64>, WatchError> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| WatchError::Connection(format!("malformed websocket frame: {}", e)))?;

    if let Some(error) = value.get("error") {
        return Err(WatchError::Connection(format!("subscription error: {}", error)));
    }

    match value
        .get("params")
        .and_then(|params| params.get("result"))
        .and_then(|header| header.get("number"))
        .and_then(|number| number.as_str())
    {
        Some(number) => parse_quantity(number).map(Some),
        None => Ok(None),
    }
}

/// Polls `eth_blockNumber` and forwards strictly increasing heights. A poll
/// that still fails after the client's own retries ends the subscription.
pub fn poll_heads(
    rpc: Arc<RpcClient>,
    every: Duration,
    heads: mpsc::Sender<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<u64> = None;

        loop {
            ticker.tick().await;

            match rpc.get_block_number().await {
                Ok(number) => {
                    if last_seen.map_or(true, |seen| number > seen) {
                        last_seen = Some(number);
                        if heads.send(number).await.is_err() {
                            debug!(url = rpc.url(), "header receiver dropped");
                            return;
                        }
                    }
                }
                Err(WatchError::Connection(e)) => {
                    error!(url = rpc.url(), "lost connection while polling headers: {}", e);
                    return;
                }
                Err(e) => {
                    warn!(url = rpc.url(), "header poll failed: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_number_from_new_heads_notification() {
        let frame = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0x9ce59a13059e417087c02d3236a0b1cc","result":{"number":"0x1b4","hash":"0xdc0818cf78f21a8e70579cb46a43643f78291264dda342ae31049421c82d21ae"}}}"#;
        assert_eq!(header_number(frame).unwrap(), Some(436));
    }

    #[test]
    fn subscription_ack_carries_no_header() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"result":"0x9ce59a13059e417087c02d3236a0b1cc"}"#;
        assert_eq!(header_number(frame).unwrap(), None);
    }

    #[test]
    fn subscription_error_is_a_connection_error() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"notifications not supported"}}"#;
        assert!(matches!(header_number(frame), Err(WatchError::Connection(_))));
    }
}

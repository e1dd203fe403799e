//! Long-running background task that tails `CertificateAdded` events from
//! the ledger and republishes them in-process.
//!
//! The block cursor lives in memory only; after a restart scanning resumes
//! from the configured start block.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::address::Address;
use crate::errors::Result;
use crate::events::{certificate_added_topic, decode_logs, CertificateAdded};
use crate::rpc::EthRpc;

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

pub struct WatcherState {
    pub rpc: Arc<EthRpc>,
    pub contract: Address,
    pub start_block: u64,
    pub poll_interval: Duration,
    pub events: broadcast::Sender<CertificateAdded>,
}

pub async fn run(state: Arc<WatcherState>, cancel: CancellationToken) {
    info!("Event watcher starting for contract {}", state.contract);

    let topic = certificate_added_topic();
    let mut next_block = state.start_block;
    let mut backoff = INITIAL_BACKOFF_SECS;

    loop {
        let delay = match poll_once(&state, &topic, next_block).await {
            Ok(next) => {
                next_block = next;
                backoff = INITIAL_BACKOFF_SECS;
                state.poll_interval
            }
            Err(e) => {
                error!("Watcher poll error (will retry in {backoff}s): {e}");
                let delay = Duration::from_secs(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!("Event watcher stopped at block {next_block}");
}

/// Scan `[from_block, latest]` once. Returns the next block to scan from.
async fn poll_once(state: &WatcherState, topic: &str, from_block: u64) -> Result<u64> {
    let latest = state.rpc.block_number().await?;
    if latest < from_block {
        return Ok(from_block);
    }

    let raw = state
        .rpc
        .logs(&state.contract, topic, from_block, latest)
        .await?;
    if !raw.is_empty() {
        let decoded = decode_logs(&raw);
        info!(
            "Polled {} raw logs → {} certificate events",
            raw.len(),
            decoded.len()
        );
        for event in decoded {
            info!(
                "Certificate added for {} ({}, {}) in block {:?}",
                event.holder, event.student_name, event.specialization, event.block_number
            );
            // No subscriber is fine; the event has been logged.
            if state.events.send(event).is_err() {
                debug!("No event subscribers");
            }
        }
    }

    Ok(latest + 1)
}

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::abi::{self, Token};
    use crate::testing::addr;

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    fn state_for(server: &MockServer, start_block: u64) -> (WatcherState, broadcast::Receiver<CertificateAdded>) {
        let (events, rx) = broadcast::channel(16);
        let state = WatcherState {
            rpc: Arc::new(EthRpc::new(Client::new(), server.uri())),
            contract: addr(0xcc),
            start_block,
            poll_interval: Duration::from_millis(10),
            events,
        };
        (state, rx)
    }

    #[tokio::test]
    async fn poll_publishes_decoded_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
            .respond_with(ok(json!("0x5")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_getLogs" })))
            .respond_with(ok(json!([{
                "topics": [
                    certificate_added_topic(),
                    abi::to_hex(&abi::encode(&[Token::Address(addr(7))])),
                ],
                "data": abi::to_hex(&abi::encode(&[
                    Token::String("Alice".into()),
                    Token::String("CS".into()),
                    Token::Uint(1_717_200_000),
                ])),
                "blockNumber": "0x4",
                "transactionHash": "0xabc",
            }])))
            .mount(&server)
            .await;

        let (state, mut rx) = state_for(&server, 0);
        let next = poll_once(&state, &certificate_added_topic(), 0).await.unwrap();
        assert_eq!(next, 6);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.holder, addr(7));
        assert_eq!(event.student_name, "Alice");
        assert_eq!(event.block_number, Some(4));
    }

    #[tokio::test]
    async fn cursor_ahead_of_chain_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
            .respond_with(ok(json!("0x2")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_getLogs" })))
            .respond_with(ok(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let (state, _rx) = state_for(&server, 10);
        assert_eq!(
            poll_once(&state, &certificate_added_topic(), 10).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let server = MockServer::start().await;
        let (state, _rx) = state_for(&server, 0);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(Arc::new(state), cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

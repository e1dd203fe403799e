//! Ledger JSON-RPC client and the registry contract adapter built on it.
//!
//! ## Failure policy
//!
//! * Nothing here retries. A failed call surfaces once, as a
//!   [`CertifierError`], and the workflow that issued it decides what to do.
//! * The only loop is the receipt wait after `eth_sendTransaction`, which
//!   polls until the node reports the transaction mined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::abi::{self, ParamType, Token};
use crate::address::Address;
use crate::errors::{CertifierError, Result};
use crate::events::RawLog;
use crate::ledger::{LedgerService, NewCertificate, RawCertificate, TxReceipt};

pub const IS_ADMIN: &str = "isAdmin()";
pub const GET_CERTIFICATE: &str = "getCertificate(address)";
pub const ADD_CERTIFICATE: &str = "addCertificate(address,string,string,uint256,string)";

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub gas_used: Option<String>,
    /// `0x1` mined and applied, `0x0` mined and reverted.
    pub status: Option<String>,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Empty result from {0}")]
    EmptyResult(String),

    #[error("Invalid quantity {0:?}")]
    Quantity(String),
}

impl From<RpcError> for CertifierError {
    fn from(e: RpcError) -> Self {
        CertifierError::LedgerUnavailable(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────

pub struct EthRpc {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl EthRpc {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue a call whose `result` may legitimately be `null`.
    pub async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = body.error {
            debug!("{method} failed: {} {}", err.code, err.message);
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(body.result)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<T, RpcError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| RpcError::EmptyResult(method.to_string()))
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, from: Option<&Address>, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let mut tx = json!({
            "to": to.to_lower_hex(),
            "data": abi::to_hex(data),
        });
        if let Some(from) = from {
            tx["from"] = json!(from.to_lower_hex());
        }
        let raw: String = self.request("eth_call", json!([tx, "latest"])).await?;
        abi::from_hex(&raw)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&raw)?)
    }

    /// Accounts the signing provider currently exposes, most preferred first.
    pub async fn accounts(&self) -> Result<Vec<String>> {
        Ok(self.request("eth_accounts", json!([])).await?)
    }

    pub async fn logs(
        &self,
        contract: &Address,
        topic: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        Ok(self
            .request(
                "eth_getLogs",
                json!([{
                    "address": contract.to_lower_hex(),
                    "topics": [topic],
                    "fromBlock": format!("0x{from_block:x}"),
                    "toBlock": format!("0x{to_block:x}"),
                }]),
            )
            .await?)
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(raw: &str) -> std::result::Result<u64, RpcError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Quantity(raw.to_string()))?;
    if digits.is_empty() {
        return Err(RpcError::Quantity(raw.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| RpcError::Quantity(raw.to_string()))
}

// ─────────────────────────────────────────────────────────
// Registry contract adapter
// ─────────────────────────────────────────────────────────

pub struct JsonRpcLedger {
    rpc: Arc<EthRpc>,
    contract: Address,
    receipt_poll: Duration,
}

impl JsonRpcLedger {
    pub fn new(rpc: Arc<EthRpc>, contract: Address, receipt_poll: Duration) -> Self {
        Self {
            rpc,
            contract,
            receipt_poll,
        }
    }

    async fn wait_for_receipt(&self, hash: &str) -> Result<RawReceipt> {
        loop {
            let receipt: Option<RawReceipt> = self
                .rpc
                .request_optional("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            debug!("Transaction {hash} pending");
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    /// Explain a mined-but-reverted write from the ledger's current state.
    async fn explain_revert(&self, caller: &Address, holder: &Address, hash: &str) -> CertifierError {
        match self.is_admin(caller).await {
            Ok(false) => return CertifierError::Authorization(*caller),
            Ok(true) => {}
            Err(e) => return e,
        }
        match self.get_certificate(holder).await {
            Ok((.., true)) => CertifierError::DuplicateHolder(*holder),
            Ok(_) => CertifierError::LedgerUnavailable(format!("transaction {hash} reverted")),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl LedgerService for JsonRpcLedger {
    async fn is_admin(&self, caller: &Address) -> Result<bool> {
        let data = abi::encode_call(IS_ADMIN, &[]);
        let out = self.rpc.call(Some(caller), &self.contract, &data).await?;
        match abi::decode(&[ParamType::Bool], &out)?.as_slice() {
            [Token::Bool(b)] => Ok(*b),
            other => Err(CertifierError::LedgerUnavailable(format!(
                "unexpected isAdmin output {other:?}"
            ))),
        }
    }

    async fn get_certificate(&self, holder: &Address) -> Result<RawCertificate> {
        let data = abi::encode_call(GET_CERTIFICATE, &[Token::Address(*holder)]);
        let out = self.rpc.call(None, &self.contract, &data).await?;
        let tokens = abi::decode(
            &[
                ParamType::String,
                ParamType::String,
                ParamType::Uint,
                ParamType::String,
                ParamType::Bool,
            ],
            &out,
        )?;
        match <[Token; 5]>::try_from(tokens) {
            Ok([
                Token::String(name),
                Token::String(specialization),
                Token::Uint(date),
                Token::String(content_id),
                Token::Bool(exists),
            ]) => Ok((name, specialization, date, content_id, exists)),
            other => Err(CertifierError::LedgerUnavailable(format!(
                "unexpected getCertificate output {other:?}"
            ))),
        }
    }

    async fn add_certificate(
        &self,
        caller: &Address,
        holder: &Address,
        certificate: &NewCertificate,
    ) -> Result<TxReceipt> {
        let data = abi::encode_call(
            ADD_CERTIFICATE,
            &[
                Token::Address(*holder),
                Token::String(certificate.student_name.clone()),
                Token::String(certificate.specialization.clone()),
                Token::Uint(certificate.issue_date),
                Token::String(certificate.document_content_id.clone()),
            ],
        );

        let submitted: std::result::Result<String, RpcError> = self
            .rpc
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": caller.to_lower_hex(),
                    "to": self.contract.to_lower_hex(),
                    "data": abi::to_hex(&data),
                }]),
            )
            .await;

        let hash = match submitted {
            Ok(hash) => hash,
            Err(RpcError::Node { message, data, .. }) => {
                let reason = revert_reason(&message, data.as_ref());
                warn!("addCertificate for {holder} rejected: {reason}");
                return Err(classify_rejection(caller, holder, &reason));
            }
            Err(e) => return Err(e.into()),
        };
        info!("Submitted addCertificate for {holder}: {hash}");

        let receipt = self.wait_for_receipt(&hash).await?;
        if receipt.status.as_deref() == Some("0x0") {
            warn!("addCertificate transaction {hash} reverted");
            return Err(self.explain_revert(caller, holder, &hash).await);
        }

        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt
                .block_number
                .as_deref()
                .map(parse_quantity)
                .transpose()?,
            gas_used: receipt.gas_used.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

/// Prefer the ABI-encoded `Error(string)` payload over the node's prose.
fn revert_reason(message: &str, data: Option<&Value>) -> String {
    data.and_then(|d| d.as_str().or_else(|| d.get("data").and_then(Value::as_str)))
        .and_then(|hex| abi::from_hex(hex).ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes))
        .unwrap_or_else(|| message.to_string())
}

fn classify_rejection(caller: &Address, holder: &Address, reason: &str) -> CertifierError {
    let lower = reason.to_lowercase();
    if lower.contains("existe deja") || lower.contains("already") {
        CertifierError::DuplicateHolder(*holder)
    } else if lower.contains("admin") {
        CertifierError::Authorization(*caller)
    } else {
        CertifierError::LedgerUnavailable(format!("transaction rejected: {reason}"))
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

//! Events emitted by the certificate registry contract.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::abi::{self, ParamType, Token};
use crate::address::Address;

/// `holder` is indexed (topic 1); the rest travel in the data payload.
pub const CERTIFICATE_ADDED: &str = "CertificateAdded(address,string,string,uint256)";

pub fn certificate_added_topic() -> String {
    abi::to_hex(&abi::event_topic(CERTIFICATE_ADDED))
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    /// Set when a reorg dropped the block that carried the log.
    #[serde(default)]
    pub removed: bool,
}

/// A decoded `CertificateAdded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateAdded {
    pub holder: Address,
    pub student_name: String,
    pub specialization: String,
    pub issue_date: u64,
    pub block_number: Option<u64>,
    pub tx_hash: Option<String>,
}

pub fn decode_logs(raw: &[RawLog]) -> Vec<CertificateAdded> {
    raw.iter()
        .filter(|log| !log.removed)
        .filter_map(|log| {
            let decoded = decode_single(log);
            if decoded.is_none() {
                warn!(
                    "Skipping undecodable log in tx {}",
                    log.transaction_hash.as_deref().unwrap_or("?")
                );
            }
            decoded
        })
        .collect()
}

fn decode_single(raw: &RawLog) -> Option<CertificateAdded> {
    if !raw.topics.first()?.eq_ignore_ascii_case(&certificate_added_topic()) {
        return None;
    }

    let holder_word = abi::from_hex(raw.topics.get(1)?).ok()?;
    let holder = match abi::decode(&[ParamType::Address], &holder_word).ok()?.pop()? {
        Token::Address(a) => a,
        _ => return None,
    };

    let data = abi::from_hex(&raw.data).ok()?;
    let tokens = abi::decode(
        &[ParamType::String, ParamType::String, ParamType::Uint],
        &data,
    )
    .ok()?;
    let [Token::String(student_name), Token::String(specialization), Token::Uint(issue_date)] =
        <[Token; 3]>::try_from(tokens).ok()?
    else {
        return None;
    };

    Some(CertificateAdded {
        holder,
        student_name,
        specialization,
        issue_date,
        block_number: raw
            .block_number
            .as_deref()
            .and_then(|b| crate::rpc::parse_quantity(b).ok()),
        tx_hash: raw.transaction_hash.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::addr;

    fn holder_topic(holder: &Address) -> String {
        abi::to_hex(&abi::encode(&[Token::Address(*holder)]))
    }

    fn certificate_log(holder: &Address, name: &str) -> RawLog {
        RawLog {
            topics: vec![certificate_added_topic(), holder_topic(holder)],
            data: abi::to_hex(&abi::encode(&[
                Token::String(name.to_string()),
                Token::String("CS".to_string()),
                Token::Uint(1_717_200_000),
            ])),
            block_number: Some("0x10".to_string()),
            transaction_hash: Some("0xfeed".to_string()),
            removed: false,
        }
    }

    #[test]
    fn topic_is_keccak_of_signature() {
        let topic = certificate_added_topic();
        assert!(topic.starts_with("0x"));
        assert_eq!(topic.len(), 66);
    }

    #[test]
    fn decode_certificate_added() {
        let events = decode_logs(&[certificate_log(&addr(9), "Alice")]);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.holder, addr(9));
        assert_eq!(ev.student_name, "Alice");
        assert_eq!(ev.specialization, "CS");
        assert_eq!(ev.issue_date, 1_717_200_000);
        assert_eq!(ev.block_number, Some(16));
        assert_eq!(ev.tx_hash.as_deref(), Some("0xfeed"));
    }

    #[test]
    fn foreign_and_removed_logs_are_skipped() {
        let mut foreign = certificate_log(&addr(1), "Bob");
        foreign.topics[0] = abi::to_hex(&abi::event_topic("Transfer(address,address,uint256)"));
        let mut removed = certificate_log(&addr(2), "Carol");
        removed.removed = true;
        let mut truncated = certificate_log(&addr(3), "Dan");
        truncated.data = "0x00".to_string();

        let events = decode_logs(&[foreign, removed, truncated, certificate_log(&addr(4), "Eve")]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].holder, addr(4));
    }

    #[test]
    fn raw_log_deserializes_from_node_json() {
        let json = serde_json::json!({
            "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "topics": [certificate_added_topic(), holder_topic(&addr(5))],
            "data": certificate_log(&addr(5), "Fay").data,
            "blockNumber": "0x3",
            "transactionHash": "0xbeef",
            "logIndex": "0x0"
        });
        let raw: RawLog = serde_json::from_value(json).unwrap();
        assert!(!raw.removed);
        assert_eq!(decode_logs(&[raw])[0].student_name, "Fay");
    }
}

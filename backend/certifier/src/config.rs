//! Application configuration loaded from environment variables.
//!
//! These are provisioning values only. The issuing authority is deliberately
//! absent: it is always asked of the ledger, never configured.

use std::time::Duration;

use crate::address::Address;
use crate::errors::{CertifierError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger JSON-RPC endpoint (e.g. http://127.0.0.1:8545)
    pub rpc_url: String,
    /// Address of the deployed certificate registry contract
    pub contract_address: Address,
    /// IPFS HTTP API base (the `add` endpoint lives under it)
    pub ipfs_api_url: String,
    /// IPFS gateway base used to build document URLs
    pub ipfs_gateway_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to poll for ledger events and account changes
    pub poll_interval_secs: u64,
    /// Delay between receipt polls while a transaction is pending
    pub receipt_poll_ms: u64,
    /// Block the event watcher starts scanning from
    pub start_block: u64,
    /// Preferred signing identity; first provider account when unset
    pub caller_address: Option<Address>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, so tests need not touch the
    /// process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            rpc_url: var("RPC_URL", "http://127.0.0.1:8545"),
            contract_address: lookup("CONTRACT_ADDRESS")
                .ok_or_else(|| {
                    CertifierError::Config(
                        "CONTRACT_ADDRESS environment variable is required".to_string(),
                    )
                })
                .and_then(|raw| {
                    Address::parse(raw.trim()).map_err(|e| {
                        CertifierError::Config(format!("Invalid CONTRACT_ADDRESS: {e}"))
                    })
                })?,
            ipfs_api_url: var("IPFS_API_URL", "http://localhost:5001"),
            ipfs_gateway_url: var("IPFS_GATEWAY_URL", "http://localhost:8080"),
            api_port: var("API_PORT", "3001")
                .parse()
                .map_err(|_| CertifierError::Config("Invalid API_PORT".to_string()))?,
            poll_interval_secs: var("POLL_INTERVAL_SECS", "5")
                .parse()
                .map_err(|_| CertifierError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            receipt_poll_ms: var("RECEIPT_POLL_MS", "500")
                .parse()
                .map_err(|_| CertifierError::Config("Invalid RECEIPT_POLL_MS".to_string()))?,
            start_block: var("START_BLOCK", "0")
                .parse()
                .map_err(|_| CertifierError::Config("Invalid START_BLOCK".to_string()))?,
            caller_address: lookup("CALLER_ADDRESS")
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| {
                    Address::parse(raw.trim()).map_err(|e| {
                        CertifierError::Config(format!("Invalid CALLER_ADDRESS: {e}"))
                    })
                })
                .transpose()?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_with(&[("CONTRACT_ADDRESS", CONTRACT)]).unwrap();
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.ipfs_api_url, "http://localhost:5001");
        assert_eq!(config.ipfs_gateway_url, "http://localhost:8080");
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.receipt_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.start_block, 0);
        assert!(config.caller_address.is_none());
        assert_eq!(config.contract_address.to_string(), CONTRACT);
    }

    #[test]
    fn contract_address_is_required() {
        let err = config_with(&[]).unwrap_err();
        assert!(matches!(err, CertifierError::Config(_)));
    }

    #[test]
    fn malformed_values_are_config_errors() {
        for vars in [
            vec![("CONTRACT_ADDRESS", "0x1234")],
            vec![("CONTRACT_ADDRESS", CONTRACT), ("API_PORT", "http")],
            vec![("CONTRACT_ADDRESS", CONTRACT), ("CALLER_ADDRESS", "me")],
        ] {
            assert!(matches!(config_with(&vars), Err(CertifierError::Config(_))));
        }
    }

    #[test]
    fn blank_caller_means_unset() {
        let config =
            config_with(&[("CONTRACT_ADDRESS", CONTRACT), ("CALLER_ADDRESS", "  ")]).unwrap();
        assert!(config.caller_address.is_none());
    }

    #[test]
    fn padded_env_addresses_are_accepted() {
        let padded = format!(" {CONTRACT}\n");
        let config = config_with(&[("CONTRACT_ADDRESS", &padded)]).unwrap();
        assert_eq!(config.contract_address.to_string(), CONTRACT);
    }
}

//! Diploma certifier.
//!
//! An authority issues one immutable certificate per holder address on an
//! Ethereum-compatible ledger, with the diploma document itself kept in
//! IPFS. Anyone can verify an address against the registry.

pub mod abi;
pub mod address;
pub mod api;
pub mod caller;
pub mod certifier;
pub mod config;
pub mod dates;
pub mod errors;
pub mod events;
pub mod identity;
pub mod issuance;
pub mod ledger;
pub mod rpc;
pub mod store;
pub mod verification;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use address::Address;
pub use certifier::Certifier;
pub use errors::{CertifierError, Result};
pub use identity::IdentityRole;
pub use issuance::{IssuanceReceipt, IssuanceRequest};
pub use verification::Verification;

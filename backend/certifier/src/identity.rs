//! Role derivation for an address.
//!
//! Roles are never stored: every call asks the ledger again.

use std::fmt;

use serde::Serialize;

use crate::address::Address;
use crate::errors::Result;
use crate::ledger::LedgerClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRole {
    /// The registry's issuing authority.
    Authority,
    /// An address holding a certificate.
    Holder,
    Unclassified,
}

impl IdentityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::Holder => "holder",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    ledger: LedgerClient,
}

impl IdentityResolver {
    pub fn new(ledger: LedgerClient) -> Self {
        Self { ledger }
    }

    /// Authority is checked before holdership, so an authority that also
    /// holds a certificate is still `Authority`. `isAdmin` is evaluated with
    /// the queried address itself as the caller context.
    pub async fn classify(&self, address: &Address) -> Result<IdentityRole> {
        if self.ledger.is_authority(address).await? {
            return Ok(IdentityRole::Authority);
        }
        if self.ledger.lookup(address).await?.exists {
            return Ok(IdentityRole::Holder);
        }
        Ok(IdentityRole::Unclassified)
    }
}

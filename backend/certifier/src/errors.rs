//! Application-wide error types.
//!
//! Every failure a workflow can surface is one of these variants, so the
//! presentation layer can render a stable message set without ever seeing a
//! raw collaborator error.

use thiserror::Error;

use crate::address::Address;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CertifierError {
    /// Missing field, malformed date, unsupported document kind.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Input that does not match the ledger's identity format.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0} is not the issuing authority")]
    Authorization(Address),

    #[error("A certificate already exists for {0}")]
    DuplicateHolder(Address),

    /// A mutating call was attempted with no connected identity.
    #[error("No connected caller identity")]
    NotConnected,

    /// The connected identity switched while a mutating call was in flight.
    #[error("Caller identity changed from {0} during the operation")]
    CallerChanged(Address),

    #[error("Document too large: {0}")]
    DocumentTooLarge(String),

    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CertifierError {
    /// `true` for input-level failures that never reached a collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidAddress(_))
    }

    /// Short identifier that stays stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidAddress(_) => "invalid_address",
            Self::Authorization(_) => "authorization",
            Self::DuplicateHolder(_) => "duplicate_holder",
            Self::NotConnected => "not_connected",
            Self::CallerChanged(_) => "caller_changed",
            Self::DocumentTooLarge(_) => "document_too_large",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Upload(_) => "upload",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, CertifierError>;

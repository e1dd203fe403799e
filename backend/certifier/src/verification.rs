//! Certificate lookup for any address, connected wallet or not.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::dates::{calendar_date, display_date};
use crate::errors::Result;
use crate::identity::{IdentityResolver, IdentityRole};
use crate::ledger::LedgerClient;
use crate::store::ContentStore;

/// A found certificate, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateView {
    pub holder: Address,
    pub student_name: String,
    pub specialization: String,
    /// Seconds since the epoch, as recorded on the ledger.
    pub issued_at: u64,
    pub issue_date: Option<NaiveDate>,
    /// `dd/mm/yyyy`
    pub issue_date_display: String,
    pub document_content_id: String,
    pub document_url: Option<String>,
    pub role: IdentityRole,
}

/// A well-formed address without a certificate is `NotFound`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Found(CertificateView),
    NotFound { address: Address, role: IdentityRole },
}

#[derive(Clone)]
pub struct VerificationWorkflow {
    ledger: LedgerClient,
    resolver: IdentityResolver,
    store: Arc<dyn ContentStore>,
}

impl VerificationWorkflow {
    pub fn new(
        ledger: LedgerClient,
        resolver: IdentityResolver,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            store,
        }
    }

    pub async fn verify(&self, candidate: &str) -> Result<Verification> {
        let address = Address::parse(candidate)?;
        let role = self.resolver.classify(&address).await?;
        let record = self.ledger.lookup(&address).await?;

        if !record.exists {
            debug!("No certificate for {address} (role {role})");
            return Ok(Verification::NotFound { address, role });
        }

        Ok(Verification::Found(CertificateView {
            holder: address,
            issue_date: calendar_date(record.issue_date),
            issue_date_display: display_date(record.issue_date),
            issued_at: record.issue_date,
            document_url: self.store.resolve_url(&record.document_content_id),
            document_content_id: record.document_content_id,
            student_name: record.student_name,
            specialization: record.specialization,
            role,
        }))
    }
}

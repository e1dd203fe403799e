//! Typed façade over the certificate registry contract.
//!
//! [`LedgerService`] is the raw, positional shape of the deployed contract;
//! [`LedgerClient`] is what the rest of the crate talks to. Positional tuples
//! stop here and become [`CertificateRecord`]s.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::errors::Result;

/// `(studentName, specialization, date, ipfsHash, exists)` exactly as the
/// contract's `getCertificate` returns it.
pub type RawCertificate = (String, String, u64, String, bool);

/// Arguments of `addCertificate`, minus the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCertificate {
    pub student_name: String,
    pub specialization: String,
    pub issue_date: u64,
    pub document_content_id: String,
}

/// Confirmation of a mined registry write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

/// The deployed registry contract.
///
/// `add_certificate` must perform its own atomic authority and existence
/// checks; callers' pre-checks are advisory only.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// `isAdmin()` evaluated in the context of `caller`.
    async fn is_admin(&self, caller: &Address) -> Result<bool>;

    async fn get_certificate(&self, holder: &Address) -> Result<RawCertificate>;

    async fn add_certificate(
        &self,
        caller: &Address,
        holder: &Address,
        certificate: &NewCertificate,
    ) -> Result<TxReceipt>;
}

/// A registry entry as seen by the workflows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub student_name: String,
    pub specialization: String,
    pub issue_date: u64,
    pub document_content_id: String,
    /// Derived from the ledger; `false` with every other field defaulted
    /// when nothing was ever written for the address.
    pub exists: bool,
}

impl From<RawCertificate> for CertificateRecord {
    fn from(raw: RawCertificate) -> Self {
        let (student_name, specialization, issue_date, document_content_id, exists) = raw;
        if !exists {
            return Self::default();
        }
        Self {
            student_name,
            specialization,
            issue_date,
            document_content_id,
            exists,
        }
    }
}

#[derive(Clone)]
pub struct LedgerClient {
    service: Arc<dyn LedgerService>,
}

impl LedgerClient {
    pub fn new(service: Arc<dyn LedgerService>) -> Self {
        Self { service }
    }

    /// `false` for every address other than the registry's fixed authority.
    pub async fn is_authority(&self, caller: &Address) -> Result<bool> {
        let authority = self.service.is_admin(caller).await?;
        debug!("isAdmin({caller}) = {authority}");
        Ok(authority)
    }

    /// Pure read. An unregistered address is not an error.
    pub async fn lookup(&self, holder: &Address) -> Result<CertificateRecord> {
        let record = CertificateRecord::from(self.service.get_certificate(holder).await?);
        debug!("getCertificate({holder}) exists={}", record.exists);
        Ok(record)
    }

    /// Irreversible once it returns `Ok`. Authorization and duplicate
    /// failures are those raised by the ledger's own guard.
    pub async fn issue(
        &self,
        caller: &Address,
        holder: &Address,
        certificate: &NewCertificate,
    ) -> Result<TxReceipt> {
        self.service
            .add_certificate(caller, holder, certificate)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CertifierError;
    use crate::testing::{addr, MemoryLedger};

    fn entry(name: &str) -> NewCertificate {
        NewCertificate {
            student_name: name.to_string(),
            specialization: "CS".to_string(),
            issue_date: 1_717_200_000,
            document_content_id: "bafy-doc".to_string(),
        }
    }

    #[test]
    fn absent_raw_record_is_fully_defaulted() {
        let raw: RawCertificate = ("ghost".into(), "x".into(), 9, "cid".into(), false);
        assert_eq!(CertificateRecord::from(raw), CertificateRecord::default());
    }

    #[tokio::test]
    async fn lookup_of_unknown_address_is_not_an_error() {
        let ledger = MemoryLedger::new(addr(1));
        let client = LedgerClient::new(ledger.clone());

        let record = client.lookup(&addr(2)).await.unwrap();
        assert!(!record.exists);
        assert_eq!(record, client.lookup(&addr(2)).await.unwrap());
    }

    #[tokio::test]
    async fn only_the_authority_is_authority() {
        let ledger = MemoryLedger::new(addr(1));
        let client = LedgerClient::new(ledger);
        assert!(client.is_authority(&addr(1)).await.unwrap());
        assert!(!client.is_authority(&addr(2)).await.unwrap());
    }

    #[tokio::test]
    async fn writes_are_once_only() {
        let ledger = MemoryLedger::new(addr(1));
        let client = LedgerClient::new(ledger.clone());

        client.issue(&addr(1), &addr(5), &entry("Alice")).await.unwrap();
        let record = client.lookup(&addr(5)).await.unwrap();
        assert!(record.exists);
        assert_eq!(record.student_name, "Alice");

        let err = client
            .issue(&addr(1), &addr(5), &entry("Mallory"))
            .await
            .unwrap_err();
        assert_eq!(err, CertifierError::DuplicateHolder(addr(5)));
        assert_eq!(client.lookup(&addr(5)).await.unwrap().student_name, "Alice");
    }

    #[tokio::test]
    async fn non_authority_write_is_rejected_even_for_fresh_holder() {
        let ledger = MemoryLedger::new(addr(1));
        let client = LedgerClient::new(ledger.clone());

        let err = client
            .issue(&addr(3), &addr(6), &entry("Bob"))
            .await
            .unwrap_err();
        assert_eq!(err, CertifierError::Authorization(addr(3)));
        assert!(!client.lookup(&addr(6)).await.unwrap().exists);
    }
}

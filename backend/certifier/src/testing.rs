//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sp_crypto_hashing::keccak_256;

use crate::address::Address;
use crate::caller::WalletSession;
use crate::errors::{CertifierError, Result};
use crate::ledger::{LedgerService, NewCertificate, RawCertificate, TxReceipt};
use crate::store::{gateway_url, ContentStore};

pub fn addr(n: u8) -> Address {
    Address::from_bytes([n; 20])
}

/// Registry with the same guard the deployed contract has: authority first,
/// then write-once per holder, both checked atomically with the write.
pub struct MemoryLedger {
    authority: Address,
    certificates: Mutex<HashMap<Address, RawCertificate>>,
    stale_reads: AtomicBool,
    unavailable: AtomicBool,
    admin_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new(authority: Address) -> Arc<Self> {
        Arc::new(Self {
            authority,
            certificates: Mutex::new(HashMap::new()),
            stale_reads: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            admin_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        })
    }

    /// Make `get_certificate` report every holder as absent, as a reader
    /// racing a concurrent issuance would observe.
    pub fn set_stale_reads(&self, stale: bool) {
        self.stale_reads.store(stale, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn admin_calls(&self) -> usize {
        self.admin_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.admin_calls() + self.lookup_calls() + self.write_calls()
    }

    pub fn certificate_count(&self) -> usize {
        self.certificates.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CertifierError::LedgerUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerService for MemoryLedger {
    async fn is_admin(&self, caller: &Address) -> Result<bool> {
        self.admin_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(*caller == self.authority)
    }

    async fn get_certificate(&self, holder: &Address) -> Result<RawCertificate> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.stale_reads.load(Ordering::SeqCst) {
            return Ok(RawCertificate::default());
        }
        Ok(self
            .certificates
            .lock()
            .unwrap()
            .get(holder)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_certificate(
        &self,
        caller: &Address,
        holder: &Address,
        certificate: &NewCertificate,
    ) -> Result<TxReceipt> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if *caller != self.authority {
            return Err(CertifierError::Authorization(*caller));
        }

        let mut certificates = self.certificates.lock().unwrap();
        if certificates.contains_key(holder) {
            return Err(CertifierError::DuplicateHolder(*holder));
        }
        certificates.insert(
            *holder,
            (
                certificate.student_name.clone(),
                certificate.specialization.clone(),
                certificate.issue_date,
                certificate.document_content_id.clone(),
                true,
            ),
        );

        let block = certificates.len() as u64;
        Ok(TxReceipt {
            transaction_hash: format!("0x{block:064x}"),
            block_number: Some(block),
            gas_used: Some(21_000),
        })
    }
}

pub const GATEWAY: &str = "http://localhost:8080";

/// Content-addressed blob map; ids are derived from the bytes.
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failure: Mutex<Option<CertifierError>>,
    store_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            blobs: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            store_calls: AtomicUsize::new(0),
        })
    }

    /// Every subsequent `store` fails with `err`.
    pub fn fail_with(&self, err: CertifierError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn content_id_for(bytes: &[u8]) -> String {
        format!("bafk{}", hex::encode(&keccak_256(bytes)[..16]))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn store(&self, bytes: Vec<u8>, _filename: &str) -> Result<String> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let id = Self::content_id_for(&bytes);
        self.blobs.lock().unwrap().insert(id.clone(), bytes);
        Ok(id)
    }

    fn resolve_url(&self, content_id: &str) -> Option<String> {
        gateway_url(GATEWAY, content_id)
    }

    async fn probe(&self, content_id: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(content_id)
    }
}

/// Store whose upload coincides with the wallet switching to `switch_to`.
pub struct SwitchingStore {
    inner: Arc<MemoryStore>,
    session: Arc<WalletSession>,
    switch_to: Address,
}

impl SwitchingStore {
    pub fn new(session: Arc<WalletSession>, switch_to: Address) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            session,
            switch_to,
        })
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl ContentStore for SwitchingStore {
    async fn store(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        self.session
            .accounts_changed(&[self.switch_to.to_lower_hex()])?;
        self.inner.store(bytes, filename).await
    }

    fn resolve_url(&self, content_id: &str) -> Option<String> {
        self.inner.resolve_url(content_id)
    }

    async fn probe(&self, content_id: &str) -> bool {
        self.inner.probe(content_id).await
    }
}

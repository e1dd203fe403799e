//! Certificate issuance.
//!
//! Gates run strictly in order and each one aborts the attempt:
//!
//! 1. input validation (no collaborator is contacted on failure)
//! 2. caller must be the issuing authority
//! 3. holder must not already be certified (advisory, see below)
//! 4. document upload
//! 5. ledger write
//!
//! The caller is pinned when the attempt starts. Its identity is confirmed
//! again after the upload, right before the ledger write; if the session
//! switched accounts in between, the attempt aborts with `CallerChanged`.
//!
//! The duplicate check in step 3 only saves an upload in the common case.
//! Two issuers can both pass it; the ledger's own write-once guard in step 5
//! is what rejects the loser. Nothing is retried: a failed upload means no
//! ledger write is attempted, and the caller resubmits from scratch.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::caller::CallerGuard;
use crate::dates::parse_graduation_date;
use crate::errors::{CertifierError, Result};
use crate::ledger::{LedgerClient, NewCertificate, TxReceipt};
use crate::store::ContentStore;

/// Media kinds accepted as a diploma document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let media_type = media_type.trim().to_ascii_lowercase();
        if media_type.starts_with("application/pdf") {
            Some(Self::Pdf)
        } else if media_type.starts_with("image/") {
            Some(Self::Image)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Issuance input as entered by the issuer.
#[derive(Debug, Clone, Default)]
pub struct IssuanceRequest {
    pub holder_address: String,
    pub student_name: String,
    pub specialization: String,
    /// `YYYY-MM-DD` or RFC 3339.
    pub graduation_date: String,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuanceReceipt {
    pub holder: Address,
    pub issue_date: u64,
    pub document_content_id: String,
    pub document_url: Option<String>,
    pub transaction: TxReceipt,
}

/// A request that passed step 1.
struct Validated {
    holder: Address,
    student_name: String,
    specialization: String,
    issue_date: u64,
    document: Document,
    kind: DocumentKind,
}

fn validate(request: IssuanceRequest) -> Result<Validated> {
    let required = |value: &str, field: &str| {
        let value = value.trim();
        if value.is_empty() {
            Err(CertifierError::Validation(format!("{field} is required")))
        } else {
            Ok(value.to_string())
        }
    };

    let student_name = required(&request.student_name, "student name")?;
    let specialization = required(&request.specialization, "specialization")?;
    required(&request.graduation_date, "graduation date")?;
    required(&request.holder_address, "holder address")?;

    let document = request
        .document
        .ok_or_else(|| CertifierError::Validation("diploma document is required".to_string()))?;
    if document.bytes.is_empty() {
        return Err(CertifierError::Validation(format!(
            "document {} is empty",
            document.filename
        )));
    }
    let kind = document
        .media_type
        .as_deref()
        .and_then(DocumentKind::from_media_type)
        .ok_or_else(|| {
            CertifierError::Validation(format!(
                "document {} must be a PDF or an image (got {})",
                document.filename,
                document.media_type.as_deref().unwrap_or("no media type")
            ))
        })?;

    Ok(Validated {
        holder: Address::parse(&request.holder_address)?,
        student_name,
        specialization,
        issue_date: parse_graduation_date(&request.graduation_date)?,
        document,
        kind,
    })
}

#[derive(Clone)]
pub struct IssuanceWorkflow {
    ledger: LedgerClient,
    store: Arc<dyn ContentStore>,
}

impl IssuanceWorkflow {
    pub fn new(ledger: LedgerClient, store: Arc<dyn ContentStore>) -> Self {
        Self { ledger, store }
    }

    pub async fn issue(
        &self,
        caller: &CallerGuard,
        request: IssuanceRequest,
    ) -> Result<IssuanceReceipt> {
        let result = self.run(caller, request).await;
        if let Err(e) = &result {
            warn!("Issuance by {} failed: {e}", caller.address());
        }
        result
    }

    async fn run(&self, caller: &CallerGuard, request: IssuanceRequest) -> Result<IssuanceReceipt> {
        let Validated {
            holder,
            student_name,
            specialization,
            issue_date,
            document,
            kind,
        } = validate(request)?;
        debug!("Validated issuance for {holder} ({kind:?}, {} bytes)", document.bytes.len());

        caller.ensure_current()?;
        let issuer = caller.address();
        if !self.ledger.is_authority(&issuer).await? {
            return Err(CertifierError::Authorization(issuer));
        }

        if self.ledger.lookup(&holder).await?.exists {
            return Err(CertifierError::DuplicateHolder(holder));
        }

        let content_id = self.store.store(document.bytes, &document.filename).await?;
        debug!("Document for {holder} stored as {content_id}");
        self.spawn_probe(content_id.clone());

        let certificate = NewCertificate {
            student_name,
            specialization,
            issue_date,
            document_content_id: content_id.clone(),
        };
        // The upload may have outlived the identity it started under.
        caller.ensure_current()?;
        let transaction = match self.ledger.issue(&issuer, &holder, &certificate).await {
            Ok(receipt) => receipt,
            // Another issuer certified the holder after our pre-check.
            Err(CertifierError::DuplicateHolder(_)) => {
                return Err(CertifierError::DuplicateHolder(holder))
            }
            Err(e) => return Err(e),
        };

        info!(
            "Certificate issued for {holder}: doc={content_id} tx={}",
            transaction.transaction_hash
        );
        Ok(IssuanceReceipt {
            holder,
            issue_date,
            document_url: self.store.resolve_url(&content_id),
            document_content_id: content_id,
            transaction,
        })
    }

    /// Log gateway reachability of a fresh upload without holding up the
    /// workflow.
    fn spawn_probe(&self, content_id: String) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if store.probe(&content_id).await {
                debug!("Document {content_id} reachable via gateway");
            } else {
                debug!("Document {content_id} not yet reachable via gateway");
            }
        });
    }
}

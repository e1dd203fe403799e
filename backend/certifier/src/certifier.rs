//! The three operations offered to the presentation layer.

use std::sync::Arc;

use crate::address::Address;
use crate::caller::CallerGuard;
use crate::errors::Result;
use crate::identity::{IdentityResolver, IdentityRole};
use crate::issuance::{IssuanceReceipt, IssuanceRequest, IssuanceWorkflow};
use crate::ledger::{LedgerClient, LedgerService};
use crate::store::ContentStore;
use crate::verification::{Verification, VerificationWorkflow};

#[derive(Clone)]
pub struct Certifier {
    resolver: IdentityResolver,
    issuance: IssuanceWorkflow,
    verification: VerificationWorkflow,
}

impl Certifier {
    pub fn new(ledger: Arc<dyn LedgerService>, store: Arc<dyn ContentStore>) -> Self {
        let ledger = LedgerClient::new(ledger);
        let resolver = IdentityResolver::new(ledger.clone());
        Self {
            issuance: IssuanceWorkflow::new(ledger.clone(), Arc::clone(&store)),
            verification: VerificationWorkflow::new(ledger, resolver.clone(), store),
            resolver,
        }
    }

    pub fn resolver(&self) -> IdentityResolver {
        self.resolver.clone()
    }

    pub async fn issue_certificate(
        &self,
        caller: &CallerGuard,
        request: IssuanceRequest,
    ) -> Result<IssuanceReceipt> {
        self.issuance.issue(caller, request).await
    }

    pub async fn verify_certificate(&self, address: &str) -> Result<Verification> {
        self.verification.verify(address).await
    }

    pub async fn classify_identity(&self, address: &str) -> Result<IdentityRole> {
        self.resolver.classify(&Address::parse(address)?).await
    }
}

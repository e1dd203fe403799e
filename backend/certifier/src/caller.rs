//! Caller context: the identity a mutating call is issued under.
//!
//! The signing provider can switch accounts at any time. [`WalletSession`]
//! turns those switches into explicit [`CallerContext`] values; workflows
//! take the context as an argument and never read ambient state. Each change
//! bumps the context's `generation` and triggers a fresh role derivation in
//! [`track_roles`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::errors::{CertifierError, Result};
use crate::events::CertificateAdded;
use crate::identity::{IdentityResolver, IdentityRole};
use crate::rpc::EthRpc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallerContext {
    pub address: Address,
    /// Incremented on every identity change.
    pub generation: u64,
}

/// Caller context plus the role derived for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallerStatus {
    pub caller: CallerContext,
    pub role: IdentityRole,
}

/// A caller context pinned at the start of a mutating call, paired with the
/// live session so the call can confirm the identity before committing.
#[derive(Debug, Clone)]
pub struct CallerGuard {
    context: CallerContext,
    current: watch::Receiver<Option<CallerContext>>,
}

impl CallerGuard {
    /// Guard for a context that no session can change.
    pub fn fixed(context: CallerContext) -> Self {
        let (_, current) = watch::channel(Some(context));
        Self { context, current }
    }

    pub fn context(&self) -> &CallerContext {
        &self.context
    }

    pub fn address(&self) -> Address {
        self.context.address
    }

    /// `CallerChanged` once the session has moved to another identity or
    /// generation, or disconnected.
    pub fn ensure_current(&self) -> Result<()> {
        if *self.current.borrow() == Some(self.context) {
            Ok(())
        } else {
            Err(CertifierError::CallerChanged(self.context.address))
        }
    }
}

pub struct WalletSession {
    current: watch::Sender<Option<CallerContext>>,
    generation: AtomicU64,
}

impl WalletSession {
    pub fn new(initial: Option<Address>) -> Self {
        let context = initial.map(|address| CallerContext {
            address,
            generation: 1,
        });
        let (current, _) = watch::channel(context);
        Self {
            current,
            generation: AtomicU64::new(u64::from(context.is_some())),
        }
    }

    pub fn current(&self) -> Option<CallerContext> {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CallerContext>> {
        self.current.subscribe()
    }

    /// Pin the current caller for a mutating call.
    pub fn guard(&self) -> Result<CallerGuard> {
        let current = self.current.subscribe();
        let context = (*current.borrow()).ok_or(CertifierError::NotConnected)?;
        Ok(CallerGuard { context, current })
    }

    /// Apply the provider's account list. An empty list disconnects; the
    /// first entry otherwise becomes the caller. Returns whether the caller
    /// identity changed.
    pub fn accounts_changed(&self, accounts: &[String]) -> Result<bool> {
        let next = accounts.first().map(|a| Address::parse(a)).transpose()?;
        Ok(self.current.send_if_modified(|current| {
            let unchanged = current.map(|c| c.address) == next;
            if unchanged {
                return false;
            }
            *current = next.map(|address| CallerContext {
                address,
                generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            });
            match current {
                Some(ctx) => info!("Caller identity is now {} (gen {})", ctx.address, ctx.generation),
                None => info!("Caller disconnected"),
            }
            true
        }))
    }

    pub fn disconnect(&self) -> bool {
        self.accounts_changed(&[]).unwrap_or(false)
    }
}

/// Order the provider's accounts so `preferred` comes first; if a preferred
/// account is configured but no longer exposed, the session disconnects.
pub fn select_accounts(accounts: Vec<String>, preferred: Option<&Address>) -> Vec<String> {
    let Some(preferred) = preferred else {
        return accounts;
    };
    let wanted = preferred.to_lower_hex();
    if accounts.iter().any(|a| a.eq_ignore_ascii_case(&wanted)) {
        vec![wanted]
    } else {
        Vec::new()
    }
}

/// Poll the signing provider's accounts and feed changes into `session`.
pub async fn track_accounts(
    session: Arc<WalletSession>,
    rpc: Arc<EthRpc>,
    preferred: Option<Address>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        match rpc.accounts().await {
            Ok(accounts) => {
                let accounts = select_accounts(accounts, preferred.as_ref());
                if let Err(e) = session.accounts_changed(&accounts) {
                    warn!("Signing provider exposed a malformed account: {e}");
                }
            }
            Err(e) => debug!("eth_accounts failed: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Account tracker stopped");
}

/// Re-derive the caller's role whenever the caller changes or the ledger
/// certifies the current caller.
pub async fn track_roles(
    session: Arc<WalletSession>,
    resolver: IdentityResolver,
    mut events: broadcast::Receiver<CertificateAdded>,
    status: watch::Sender<Option<CallerStatus>>,
    cancel: CancellationToken,
) {
    let mut changes = session.subscribe();
    changes.mark_changed();

    loop {
        let caller = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                *changes.borrow_and_update()
            }
            event = events.recv() => match event {
                Ok(ev) if session.current().map(|c| c.address) == Some(ev.holder) => {
                    session.current()
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Role tracker skipped {n} ledger events");
                    session.current()
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let Some(caller) = caller else {
            status.send_replace(None);
            continue;
        };

        match resolver.classify(&caller.address).await {
            // A newer identity may have arrived while the ledger answered.
            Ok(_) if session.current() != Some(caller) => {
                debug!("Discarding role for superseded caller gen {}", caller.generation);
            }
            Ok(role) => {
                info!("Caller {} classified as {role}", caller.address);
                status.send_replace(Some(CallerStatus { caller, role }));
            }
            Err(e) => {
                warn!("Could not classify caller {}: {e}", caller.address);
                status.send_replace(None);
            }
        }
    }
    debug!("Role tracker stopped");
}

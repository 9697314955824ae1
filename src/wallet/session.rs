//! Explicit wallet connection context.
//!
//! A [`WalletSession`] owns the connected signer and account for one payer.
//! Confirmation tasks started on behalf of the session hold a child of the
//! session's cancellation token, so `dispose()` stops all of them.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chain::Network;
use crate::wallet::signer::{WalletError, WalletResult, WalletSigner};

/// Connection state published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected { kind: String, account: String },
}

pub struct WalletSession {
    signer: Arc<dyn WalletSigner>,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: ArcSwap<CancellationToken>,
}

impl WalletSession {
    pub fn new(signer: Arc<dyn WalletSigner>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            signer,
            status_tx,
            cancel: ArcSwap::from_pointee(CancellationToken::new()),
        }
    }

    /// Ask the wallet for accounts and mark the session connected.
    ///
    /// A wallet exposing no accounts is treated as a refusal.
    pub async fn connect(&self) -> WalletResult<String> {
        let accounts = self.signer.request_accounts().await?;
        let account = accounts.into_iter().next().ok_or(WalletError::UserRejected)?;

        if self.cancel.load().is_cancelled() {
            self.cancel.store(Arc::new(CancellationToken::new()));
        }

        tracing::info!(kind = self.signer.kind(), account = %account, "Wallet connected");
        self.status_tx.send_replace(ConnectionStatus::Connected {
            kind: self.signer.kind().to_string(),
            account: account.clone(),
        });
        Ok(account)
    }

    /// Disconnect and cancel every confirmation task tied to this session.
    pub fn dispose(&self) {
        self.cancel.load().cancel();
        if self.status_tx.send_replace(ConnectionStatus::Disconnected) != ConnectionStatus::Disconnected {
            tracing::info!(kind = self.signer.kind(), "Wallet disconnected");
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.status_tx.borrow(), ConnectionStatus::Connected { .. })
    }

    pub fn account(&self) -> Option<String> {
        match &*self.status_tx.borrow() {
            ConnectionStatus::Connected { account, .. } => Some(account.clone()),
            ConnectionStatus::Disconnected => None,
        }
    }

    pub fn supports(&self, network: Network) -> bool {
        self.signer.supports(network)
    }

    pub fn signer(&self) -> Arc<dyn WalletSigner> {
        self.signer.clone()
    }

    /// Token for work that must stop when the session is disposed.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.load().child_token()
    }
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("kind", &self.signer.kind())
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        self.cancel.load().cancel();
    }
}

//! Wallet signers and connection sessions.
//!
//! # Data Flow
//! ```text
//! WalletSession::connect → WalletSigner::request_accounts
//! payments::submitter    → WalletSigner::sign_and_send(TransferRequest) → reference
//! WalletSession::dispose → cancels confirmation tasks holding a child token
//! ```

pub mod session;
pub mod signer;

pub use session::{ConnectionStatus, WalletSession};
pub use signer::{
    classify_provider_error, LocalEvmSigner, TransferRequest, WalletError, WalletResult, WalletSigner,
};

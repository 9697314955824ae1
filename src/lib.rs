//! Global BUSAN donation pipeline.
//!
//! Validate → submit → wait for confirmation → verify → record, for
//! wallet transfers (EVM, Solana), card payments and hosted crypto charges,
//! plus refunds against the recorded ledger.

pub mod admin;
pub mod chain;
pub mod config;
pub mod currency;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod processor;
pub mod wallet;

pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use payments::{DonationReceipt, DonationRequest, DonationService, PaymentInstrument};

//! Donation pipeline.
//!
//! # Data Flow
//! ```text
//! DonationRequest + PaymentInstrument
//!     → service.rs validate_request (PaymentValidator, recipient format)
//!     → submitter.rs (wallet transfer | card intent + confirmation | hosted charge)
//!     → waiter.rs (fixed-interval polling of the network's adapter)
//!     → verifier.rs (amount within tolerance, recipient match)
//!     → ledger.rs LedgerRecorder (idempotent upsert by external reference)
//!     → DonationReceipt
//!
//! refund.rs runs separately against a recorded LedgerEntry.
//! ```
//!
//! # Ledger status
//! - `confirmed` only after verification succeeds
//! - timed out or unverified settlements are `pending`
//! - `refunded` is reached only from `confirmed`, and never left

pub mod ledger;
pub mod refund;
pub mod service;
pub mod submitter;
pub mod supabase;
pub mod types;
pub mod verifier;
pub mod waiter;

pub use ledger::{LedgerFilter, LedgerRecorder, LedgerStore, MemoryLedgerStore, StoreError, StoreResult};
pub use refund::{can_refund, RefundEligibility, RefundManager};
pub use service::DonationService;
pub use submitter::Submitter;
pub use supabase::SupabaseLedgerStore;
pub use types::{
    ConfirmationResult, DonationError, DonationReceipt, DonationRequest, LedgerEntry, LedgerStatus,
    NewLedgerRecord, PaymentInstrument, RefundMode, RefundOptions, RefundReceipt, RefundRequest,
    TerminalState, TransactionHandle, VerificationOutcome,
};
pub use verifier::Verifier;
pub use waiter::{ConfirmationTask, ConfirmationWaiter, WaitOutcome, WaitState, WaiterConfig};

//! Payment processors: card (Stripe) and hosted crypto checkout (Coinbase Commerce).
//!
//! # Data Flow
//! ```text
//! payments::submitter
//!     → CardProcessor::create_payment_intent → CardConfirmer (3-D Secure)
//!     → CryptoChargeProcessor::create_charge → hosted_url for the payer
//!
//! payments::waiter
//!     → CardStatusAdapter / ChargeStatusAdapter (NetworkAdapter over status lookups)
//!
//! payments::refund
//!     → CardProcessor::refund (automatic reversal, card only)
//! ```

pub mod coinbase;
pub mod stripe;
pub mod types;

pub use coinbase::{ChargeStatusAdapter, CoinbaseCommerce};
pub use stripe::{CardStatusAdapter, StripeClient};
pub use types::{
    CardConfirmation, CardConfirmer, CardProcessor, CardRefund, Charge, ChargeStatus,
    CryptoChargeProcessor, PaymentIntent, ProcessorError, ProcessorResult,
};

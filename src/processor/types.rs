//! Processor-facing traits, payloads and errors.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::currency::Currency;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor refused the request (validation, declined card...).
    #[error("{processor} rejected request: {message}")]
    Rejected {
        processor: &'static str,
        message: String,
    },

    /// Transport failure or 5xx. Safe to retry later.
    #[error("{processor} unavailable: {reason}")]
    Unavailable {
        processor: &'static str,
        reason: String,
    },

    /// The processor is not configured (missing key, disabled).
    #[error("Processor not configured: {0}")]
    NotConfigured(String),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// A card payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the client-side confirmation step; never logged.
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    /// Requested amount in minor units.
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Result of on-device confirmation (3-D Secure etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardConfirmation {
    pub status: String,
    pub id: String,
}

impl CardConfirmation {
    /// Whether the processor accepted the payment for settlement.
    pub fn is_accepted(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "processing" | "requires_capture")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRefund {
    pub id: String,
    pub status: String,
    pub amount: i64,
}

#[async_trait]
pub trait CardProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &Currency,
        metadata: &HashMap<String, String>,
    ) -> ProcessorResult<PaymentIntent>;

    async fn retrieve_payment_intent(&self, id: &str) -> ProcessorResult<PaymentIntent>;

    /// Reverse a payment. `amount_minor = None` refunds the full amount.
    async fn refund(&self, payment_intent_id: &str, amount_minor: Option<i64>) -> ProcessorResult<CardRefund>;
}

/// The client-side step that completes a payment intent.
#[async_trait]
pub trait CardConfirmer: Send + Sync {
    async fn confirm(&self, intent: &PaymentIntent) -> ProcessorResult<CardConfirmation>;
}

/// Lifecycle states of a hosted crypto charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    New,
    Pending,
    Completed,
    Confirmed,
    Expired,
    Canceled,
    Unresolved,
    Resolved,
    /// Any other timeline status, e.g. `REFUND PENDING`. Treated as pending.
    #[serde(other)]
    Unknown,
}

impl ChargeStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, ChargeStatus::Completed | ChargeStatus::Confirmed | ChargeStatus::Resolved)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, ChargeStatus::Expired | ChargeStatus::Canceled)
    }
}

/// A hosted-checkout charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charge {
    pub id: String,
    pub code: String,
    pub hosted_url: String,
    pub status: ChargeStatus,
    /// Priced amount in the charge's local currency.
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
}

#[async_trait]
pub trait CryptoChargeProcessor: Send + Sync {
    async fn create_charge(
        &self,
        name: &str,
        amount: Decimal,
        currency: &Currency,
        metadata: &HashMap<String, String>,
    ) -> ProcessorResult<Charge>;

    async fn get_charge(&self, code: &str) -> ProcessorResult<Charge>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_status_parsing() {
        let status: ChargeStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert!(status.is_settled());
        let status: ChargeStatus = serde_json::from_str("\"EXPIRED\"").unwrap();
        assert!(status.is_dead());
        let status: ChargeStatus = serde_json::from_str("\"NEW\"").unwrap();
        assert!(!status.is_settled() && !status.is_dead());
        let status: ChargeStatus = serde_json::from_str("\"REFUND PENDING\"").unwrap();
        assert_eq!(status, ChargeStatus::Unknown);
        assert!(!status.is_settled() && !status.is_dead());
    }

    #[test]
    fn test_card_confirmation_acceptance() {
        let ok = CardConfirmation { status: "succeeded".into(), id: "pi_1".into() };
        let declined = CardConfirmation { status: "requires_payment_method".into(), id: "pi_1".into() };
        assert!(ok.is_accepted());
        assert!(!declined.is_accepted());
    }
}

//! Donation pipeline types: requests, handles, results, ledger rows and errors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::Network;
use crate::currency::{Currency, PaymentMethod};
use crate::processor::CardConfirmer;
use crate::wallet::WalletSession;

/// A donation as requested by the payer. Not modified after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationRequest {
    /// Wallet address or authenticated email.
    pub payer: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub network: Network,
    /// Transfer target for wallet payments.
    #[serde(default)]
    pub recipient: Option<String>,
    /// Amount the settlement must match, in `currency`. `None` skips the check.
    #[serde(default)]
    pub expected_amount: Option<Decimal>,
    /// Recipient the settlement must match. `None` skips the check.
    #[serde(default)]
    pub expected_recipient: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DonationRequest {
    /// Request pinned to its own amount; add a recipient with [`Self::with_recipient`].
    pub fn new(payer: impl Into<String>, amount: Decimal, currency: impl Into<Currency>, network: Network) -> Self {
        Self {
            payer: payer.into(),
            amount,
            currency: currency.into(),
            network,
            recipient: None,
            expected_amount: Some(amount),
            expected_recipient: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    /// Send to `recipient` and expect the settlement to reach it.
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        let recipient = recipient.into();
        self.expected_recipient = Some(recipient.clone());
        self.recipient = Some(recipient);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Drop both pinned expectations (open-ended donation).
    pub fn without_expectations(mut self) -> Self {
        self.expected_amount = None;
        self.expected_recipient = None;
        self
    }

    pub fn method(&self) -> PaymentMethod {
        self.network.payment_method()
    }
}

/// How the payer pays for one donation.
#[derive(Clone)]
pub enum PaymentInstrument {
    /// Direct transfer signed by a connected wallet.
    Wallet(Arc<WalletSession>),
    /// Card payment completed by the payer's on-device confirmation.
    Card(Arc<dyn CardConfirmer>),
    /// Hosted checkout; the payer completes it at the returned URL.
    HostedCheckout,
}

impl fmt::Debug for PaymentInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentInstrument::Wallet(session) => f.debug_tuple("Wallet").field(session).finish(),
            PaymentInstrument::Card(_) => f.write_str("Card"),
            PaymentInstrument::HostedCheckout => f.write_str("HostedCheckout"),
        }
    }
}

/// One submitted attempt. Retries get a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub external_reference: String,
    pub network: Network,
    pub submitted_at: DateTime<Utc>,
    /// Where the payer completes a hosted checkout.
    #[serde(default)]
    pub checkout_url: Option<String>,
}

impl TransactionHandle {
    pub fn new(external_reference: impl Into<String>, network: Network) -> Self {
        Self {
            external_reference: external_reference.into(),
            network,
            submitted_at: Utc::now(),
            checkout_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Confirmed,
    Failed,
    /// Attempts exhausted. The handle stays valid for a later re-query.
    TimedOut,
}

/// What the confirmation waiter observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationResult {
    pub handle: TransactionHandle,
    pub terminal_state: TerminalState,
    pub confirmations: u64,
    pub block_or_slot: Option<u64>,
    pub raw_amount: Option<Decimal>,
    pub raw_currency: Option<Currency>,
    pub raw_recipient: Option<String>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub handle: TransactionHandle,
    pub verified: bool,
    pub reason_if_unverified: Option<String>,
    /// Observed amount expressed in the request currency.
    pub normalized_amount: Option<Decimal>,
    pub normalized_recipient: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Confirmed,
    Failed,
    Refunded,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Confirmed => "confirmed",
            LedgerStatus::Failed => "failed",
            LedgerStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(LedgerStatus::Pending),
            "confirmed" => Ok(LedgerStatus::Confirmed),
            "failed" => Ok(LedgerStatus::Failed),
            "refunded" => Ok(LedgerStatus::Refunded),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

/// Durable record of one donation attempt, unique by `external_reference`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub payer: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub external_reference: String,
    pub status: LedgerStatus,
    pub method: PaymentMethod,
    pub network: Network,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by an upsert. Store-assigned fields are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLedgerRecord {
    pub payer: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub external_reference: String,
    pub status: LedgerStatus,
    pub method: PaymentMethod,
    pub network: Network,
}

impl NewLedgerRecord {
    pub fn from_request(request: &DonationRequest, handle: &TransactionHandle, status: LedgerStatus) -> Self {
        Self {
            payer: request.payer.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            external_reference: handle.external_reference.clone(),
            status,
            method: request.method(),
            network: handle.network,
        }
    }
}

/// A refund that must be handled by a person (no programmatic reversal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: Uuid,
    pub ledger_entry_id: Uuid,
    pub external_reference: String,
    pub payer: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub network: Network,
    pub reason: Option<String>,
    pub status: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefundMode {
    /// Funds were returned by the processor.
    Reversed,
    /// Only a request was logged; nothing has been returned yet.
    ManualRequest,
}

impl RefundMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundMode::Reversed => "reversed",
            RefundMode::ManualRequest => "manual-request",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundOptions {
    /// Partial amount in the entry currency. `None` refunds the full amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a refund attempt.
///
/// `success` means "reversed" for [`RefundMode::Reversed`] and "logged for
/// manual processing" for [`RefundMode::ManualRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundReceipt {
    pub success: bool,
    pub mode: RefundMode,
    pub message: String,
    pub processor_refund_id: Option<String>,
    pub ledger_entry: Option<LedgerEntry>,
    pub request: Option<RefundRequest>,
}

/// Errors surfaced by the donation pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DonationError {
    /// Bad amount, currency or request shape. Never reaches the network.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User rejected the transaction")]
    UserRejected,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("{processor} rejected the payment: {message}")]
    ProcessorRejected { processor: String, message: String },

    #[error("No wallet provider: {0}")]
    NoProvider(String),

    /// Transient; the same query can be asked again.
    #[error("{network} unavailable during {operation}{}: {reason}", reference.as_ref().map(|r| format!(" for {}", r)).unwrap_or_default())]
    ChainUnavailable {
        network: Network,
        reference: Option<String>,
        operation: String,
        reason: String,
    },

    /// Sent, but not confirmed within the attempt budget.
    #[error("Confirmation of {reference} on {network} timed out after {attempts} attempts")]
    ConfirmationTimedOut {
        reference: String,
        network: Network,
        attempts: u32,
    },

    /// Polling was cancelled before a terminal state.
    #[error("Stopped waiting for {reference}")]
    ConfirmationAbandoned { reference: String },

    /// The network reported the submitted transaction as failed.
    #[error("Transaction {reference} failed: {reason}")]
    TransactionFailed { reference: String, reason: String },

    /// Confirmed, but amount or recipient disagree with the request.
    #[error("Verification of {reference} failed: {reason}")]
    VerificationMismatch { reference: String, reason: String },

    /// The payment happened but the ledger write did not.
    #[error("Failed to record {reference}: {reason}")]
    PersistenceFailed { reference: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DonationError {
    /// Short stable code for logs, metrics and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            DonationError::Validation(_) => "validation",
            DonationError::UserRejected => "user_rejected",
            DonationError::InsufficientFunds(_) => "insufficient_funds",
            DonationError::ProcessorRejected { .. } => "processor_rejected",
            DonationError::NoProvider(_) => "no_provider",
            DonationError::ChainUnavailable { .. } => "chain_unavailable",
            DonationError::ConfirmationTimedOut { .. } => "confirmation_timed_out",
            DonationError::ConfirmationAbandoned { .. } => "confirmation_abandoned",
            DonationError::TransactionFailed { .. } => "transaction_failed",
            DonationError::VerificationMismatch { .. } => "verification_mismatch",
            DonationError::PersistenceFailed { .. } => "persistence_failed",
            DonationError::Config(_) => "config",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DonationError::ChainUnavailable { .. } | DonationError::ConfirmationTimedOut { .. }
        )
    }

    /// The external reference this error is about, if a handle exists.
    pub fn reference(&self) -> Option<&str> {
        match self {
            DonationError::ChainUnavailable { reference, .. } => reference.as_deref(),
            DonationError::ConfirmationTimedOut { reference, .. }
            | DonationError::ConfirmationAbandoned { reference }
            | DonationError::TransactionFailed { reference, .. }
            | DonationError::VerificationMismatch { reference, .. }
            | DonationError::PersistenceFailed { reference, .. } => Some(reference),
            _ => None,
        }
    }

    /// Text safe to show the payer.
    ///
    /// Once a reference exists the message never says the donation failed;
    /// it says what could not be confirmed or recorded and quotes the reference.
    pub fn user_message(&self) -> String {
        match self {
            DonationError::Validation(message) => message.clone(),
            DonationError::UserRejected => "You cancelled the transaction in your wallet.".to_string(),
            DonationError::InsufficientFunds(_) => {
                "Your wallet does not have enough funds for this donation.".to_string()
            }
            DonationError::ProcessorRejected { message, .. } => {
                format!("The payment was declined: {}", message)
            }
            DonationError::NoProvider(_) => {
                "No wallet is available. Please install or connect a wallet and try again.".to_string()
            }
            DonationError::ChainUnavailable { network, reference: Some(reference), .. } => format!(
                "We could not reach the {} network to confirm your transaction. Your reference is {}.",
                network, reference
            ),
            DonationError::ChainUnavailable { network, reference: None, .. } => format!(
                "The {} network is temporarily unavailable. Please try again shortly.",
                network
            ),
            DonationError::ConfirmationTimedOut { reference, .. } => format!(
                "Your transaction was sent but is not confirmed yet. We will keep checking; your reference is {}.",
                reference
            ),
            DonationError::ConfirmationAbandoned { reference } => format!(
                "We stopped checking on your transaction. Your reference is {}.",
                reference
            ),
            DonationError::TransactionFailed { reference, .. } => format!(
                "The network could not complete transaction {}. If funds left your account, contact support with this reference.",
                reference
            ),
            DonationError::VerificationMismatch { reference, .. } => format!(
                "We received your transaction but could not match it to your donation. Our team will review reference {}.",
                reference
            ),
            DonationError::PersistenceFailed { reference, .. } => format!(
                "Your payment succeeded but we couldn't record it. Please contact support with reference {}.",
                reference
            ),
            DonationError::Config(_) => "Donations are temporarily unavailable.".to_string(),
        }
    }
}

/// Everything the caller learns from one `donate` call.
#[derive(Debug, Clone)]
pub struct DonationReceipt {
    /// False only when nothing was sent or the network reported failure.
    pub success: bool,
    pub handle: Option<TransactionHandle>,
    pub verified: bool,
    pub ledger_entry: Option<LedgerEntry>,
    pub confirmation: Option<ConfirmationResult>,
    pub explorer_url: Option<String>,
    pub error: Option<DonationError>,
}

impl DonationReceipt {
    pub fn rejected(error: DonationError) -> Self {
        Self {
            success: false,
            handle: None,
            verified: false,
            ledger_entry: None,
            confirmation: None,
            explorer_url: None,
            error: Some(error),
        }
    }

    pub fn user_message(&self) -> Option<String> {
        self.error.as_ref().map(DonationError::user_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_builders() {
        let request = DonationRequest::new("donor@example.com", dec!(1.0), "eth", Network::Ethereum)
            .with_recipient("0xAAA");
        assert_eq!(request.currency.as_str(), "ETH");
        assert_eq!(request.expected_amount, Some(dec!(1.0)));
        assert_eq!(request.expected_recipient.as_deref(), Some("0xAAA"));

        let open = request.without_expectations();
        assert!(open.expected_amount.is_none());
        assert!(open.expected_recipient.is_none());
        assert_eq!(open.recipient.as_deref(), Some("0xAAA"));
    }

    #[test]
    fn test_messages_after_broadcast_never_say_failed() {
        let errors = [
            DonationError::ConfirmationTimedOut {
                reference: "0xabc".into(),
                network: Network::Ethereum,
                attempts: 3,
            },
            DonationError::ConfirmationAbandoned { reference: "0xabc".into() },
            DonationError::VerificationMismatch { reference: "0xabc".into(), reason: "amount".into() },
            DonationError::PersistenceFailed { reference: "0xabc".into(), reason: "down".into() },
            DonationError::ChainUnavailable {
                network: Network::Polygon,
                reference: Some("0xabc".into()),
                operation: "poll".into(),
                reason: "timeout".into(),
            },
        ];
        for error in errors {
            let message = error.user_message();
            assert!(message.contains("0xabc"), "{}", message);
            assert!(!message.to_lowercase().contains("donation failed"), "{}", message);
        }
    }

    #[test]
    fn test_persistence_message() {
        let error = DonationError::PersistenceFailed { reference: "pi_1".into(), reason: "503".into() };
        assert!(error.user_message().starts_with("Your payment succeeded but we couldn't record it"));
        assert_eq!(error.code(), "persistence_failed");
    }

    #[test]
    fn test_ledger_status_round_trip_names() {
        assert_eq!("Confirmed".parse::<LedgerStatus>().unwrap(), LedgerStatus::Confirmed);
        assert!("settled".parse::<LedgerStatus>().is_err());
        assert_eq!(serde_json::to_string(&RefundMode::ManualRequest).unwrap(), "\"manual-request\"");
    }
}

//! Refund eligibility and processing.
//!
//! Card payments are reversed by the processor and the entry moves to
//! `refunded`. The entry is claimed (`confirmed` → `refunded`) in the store
//! before the processor is called, so at most one reversal runs per entry.
//! Crypto payments (direct transfers and hosted charges) cannot be reversed
//! programmatically: a refund request is logged for manual follow-up and the
//! entry status is left alone.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::currency::{to_minor_units, PaymentMethod};
use crate::observability::metrics;
use crate::payments::ledger::LedgerStore;
use crate::payments::types::{LedgerEntry, LedgerStatus, RefundMode, RefundOptions, RefundReceipt, RefundRequest};
use crate::processor::CardProcessor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundEligibility {
    pub can_refund: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RefundEligibility {
    fn allowed() -> Self {
        Self {
            can_refund: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_refund: false,
            reason: Some(reason.into()),
        }
    }
}

/// Status first, then age. Age is `now - created_at` and must not exceed `max_days`.
pub fn can_refund(entry: &LedgerEntry, max_days: u32, now: DateTime<Utc>) -> RefundEligibility {
    match entry.status {
        LedgerStatus::Confirmed => {}
        LedgerStatus::Pending => return RefundEligibility::denied("Donation is still pending confirmation"),
        LedgerStatus::Failed => return RefundEligibility::denied("Failed donations cannot be refunded"),
        LedgerStatus::Refunded => return RefundEligibility::denied("Donation has already been refunded"),
    }

    if now - entry.created_at > Duration::days(i64::from(max_days)) {
        return RefundEligibility::denied(format!("Refund window of {} days has expired", max_days));
    }

    RefundEligibility::allowed()
}

/// The amount to refund: `requested`, or the full amount when absent.
fn refund_amount(entry: &LedgerEntry, requested: Option<Decimal>) -> Result<Decimal, String> {
    match requested {
        None => Ok(entry.amount),
        Some(amount) if amount <= Decimal::ZERO || amount > entry.amount => Err(format!(
            "Refund amount must be between 0 and {} {}",
            entry.amount, entry.currency
        )),
        Some(amount) => Ok(amount),
    }
}

#[derive(Clone)]
pub struct RefundManager {
    store: Arc<dyn LedgerStore>,
    card: Option<Arc<dyn CardProcessor>>,
    max_days: u32,
}

impl RefundManager {
    pub fn new(store: Arc<dyn LedgerStore>, max_days: u32) -> Self {
        Self {
            store,
            card: None,
            max_days,
        }
    }

    pub fn with_card_processor(mut self, processor: Arc<dyn CardProcessor>) -> Self {
        self.card = Some(processor);
        self
    }

    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    pub fn can_refund(&self, entry: &LedgerEntry) -> RefundEligibility {
        can_refund(entry, self.max_days, Utc::now())
    }

    /// Check eligibility, then dispatch on the entry's payment method.
    pub async fn refund(&self, entry: &LedgerEntry, options: RefundOptions) -> RefundReceipt {
        let eligibility = self.can_refund(entry);
        if !eligibility.can_refund {
            let reason = eligibility.reason.unwrap_or_default();
            tracing::info!(reference = %entry.external_reference, reason = %reason, "Refund refused");
            return RefundReceipt {
                success: false,
                mode: mode_for(entry.method),
                message: reason,
                processor_refund_id: None,
                ledger_entry: Some(entry.clone()),
                request: None,
            };
        }
        self.process_refund(entry.method, entry, options).await
    }

    /// Run the method-specific refund path without an eligibility check.
    pub async fn process_refund(
        &self,
        method: PaymentMethod,
        entry: &LedgerEntry,
        options: RefundOptions,
    ) -> RefundReceipt {
        let receipt = match method {
            PaymentMethod::Card => self.reverse_card_payment(entry, options).await,
            PaymentMethod::CryptoProcessor => self.request_manual_refund(entry, options).await,
        };
        metrics::record_refund(receipt.mode.as_str(), receipt.success);
        receipt
    }

    async fn reverse_card_payment(&self, entry: &LedgerEntry, options: RefundOptions) -> RefundReceipt {
        let failed = |message: String| RefundReceipt {
            success: false,
            mode: RefundMode::Reversed,
            message,
            processor_refund_id: None,
            ledger_entry: Some(entry.clone()),
            request: None,
        };

        let Some(processor) = &self.card else {
            return failed("Card refunds are not configured".to_string());
        };

        let amount_minor = match refund_amount(entry, options.amount) {
            Err(message) => return failed(message),
            Ok(_) if options.amount.is_none() => None,
            Ok(amount) => match to_minor_units(amount, &entry.currency) {
                Some(minor) => Some(minor),
                None => return failed(format!("{} {} cannot be refunded", amount, entry.currency)),
            },
        };

        let reference = &entry.external_reference;
        let claimed = match self
            .store
            .transition(reference, LedgerStatus::Confirmed, LedgerStatus::Refunded)
            .await
        {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tracing::info!(reference = %reference, "Refund refused; entry is no longer confirmed");
                return failed("Donation has already been refunded or is no longer confirmed".to_string());
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "Could not claim ledger entry for refund");
                return failed(format!("Refund could not be started: {}", e));
            }
        };

        match processor.refund(reference, amount_minor).await {
            Ok(refund) => RefundReceipt {
                success: true,
                mode: RefundMode::Reversed,
                message: "Payment reversed".to_string(),
                processor_refund_id: Some(refund.id),
                ledger_entry: Some(claimed),
                request: None,
            },
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "Card refund failed");
                if let Err(release) = self
                    .store
                    .transition(reference, LedgerStatus::Refunded, LedgerStatus::Confirmed)
                    .await
                {
                    tracing::error!(
                        reference = %reference,
                        error = %release,
                        "Refund failed and the entry could not be returned to confirmed"
                    );
                }
                failed(format!("Refund could not be issued: {}", e))
            }
        }
    }

    async fn request_manual_refund(&self, entry: &LedgerEntry, options: RefundOptions) -> RefundReceipt {
        let failed = |message: String| RefundReceipt {
            success: false,
            mode: RefundMode::ManualRequest,
            message,
            processor_refund_id: None,
            ledger_entry: Some(entry.clone()),
            request: None,
        };

        let amount = match refund_amount(entry, options.amount) {
            Ok(amount) => amount,
            Err(message) => return failed(message),
        };

        let request = RefundRequest {
            id: Uuid::new_v4(),
            ledger_entry_id: entry.id,
            external_reference: entry.external_reference.clone(),
            payer: entry.payer.clone(),
            amount,
            currency: entry.currency.clone(),
            network: entry.network,
            reason: options.reason,
            status: "pending_manual_review".to_string(),
            requested_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_refund_request(&request).await {
            tracing::error!(
                request_id = %request.id,
                reference = %entry.external_reference,
                error = %e,
                "Could not store refund request"
            );
            return failed(format!(
                "Refund request for {} could not be logged: {}. Please try again.",
                entry.external_reference, e
            ));
        }

        tracing::info!(
            request_id = %request.id,
            reference = %entry.external_reference,
            network = %entry.network,
            amount = %request.amount,
            currency = %request.currency,
            "Refund request logged for manual processing"
        );

        RefundReceipt {
            success: true,
            mode: RefundMode::ManualRequest,
            message: "Refund request logged for manual processing. No funds have been returned yet.".to_string(),
            processor_refund_id: None,
            ledger_entry: Some(entry.clone()),
            request: Some(request),
        }
    }
}

fn mode_for(method: PaymentMethod) -> RefundMode {
    match method {
        PaymentMethod::Card => RefundMode::Reversed,
        PaymentMethod::CryptoProcessor => RefundMode::ManualRequest,
    }
}

impl std::fmt::Debug for RefundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefundManager")
            .field("max_days", &self.max_days)
            .field("card", &self.card.is_some())
            .finish()
    }
}

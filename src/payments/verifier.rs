//! Checks a confirmed settlement against what was requested.
//!
//! An absent expectation skips that check. Missing observations never
//! error; they yield `verified = false` with a reason.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::currency::{Converter, Currency};
use crate::payments::types::{ConfirmationResult, DonationRequest, TerminalState, VerificationOutcome};

#[derive(Debug, Clone)]
pub struct Verifier {
    converter: Arc<Converter>,
}

/// Hex addresses compare case-insensitively; everything else exactly.
pub fn recipients_match(expected: &str, observed: &str) -> bool {
    let (expected, observed) = (expected.trim(), observed.trim());
    if is_hex_address(expected) && is_hex_address(observed) {
        expected.eq_ignore_ascii_case(observed)
    } else {
        expected == observed
    }
}

fn is_hex_address(value: &str) -> bool {
    value.len() > 2 && (value.starts_with("0x") || value.starts_with("0X"))
}

fn normalize_recipient(value: &str) -> String {
    let value = value.trim();
    if is_hex_address(value) {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

impl Verifier {
    pub fn new(converter: Arc<Converter>) -> Self {
        Self { converter }
    }

    /// Observed amount expressed in `target`, if it can be.
    fn normalize_amount(&self, amount: Decimal, from: &Currency, target: &Currency) -> Result<Decimal, String> {
        let conversion = self.converter.convert_checked(amount, from, target);
        match conversion.warning {
            Some(warning) => Err(format!("cannot compare amounts: {}", warning)),
            None => Ok(conversion.amount),
        }
    }

    pub fn verify(&self, result: &ConfirmationResult, request: &DonationRequest) -> VerificationOutcome {
        let mut reasons = Vec::new();

        if result.terminal_state != TerminalState::Confirmed {
            reasons.push(format!("transaction is not confirmed ({:?})", result.terminal_state).to_lowercase());
        }

        let observed_currency = result.raw_currency.clone().unwrap_or_else(|| request.currency.clone());
        let normalized_amount = result
            .raw_amount
            .map(|amount| self.normalize_amount(amount, &observed_currency, &request.currency));

        if let Some(expected) = request.expected_amount {
            match &normalized_amount {
                None => reasons.push("no amount was observed".to_string()),
                Some(Err(reason)) => reasons.push(reason.clone()),
                Some(Ok(observed)) => {
                    let tolerance = request.currency.tolerance();
                    if (*observed - expected).abs() > tolerance {
                        reasons.push(format!(
                            "amount mismatch: expected {} {}, observed {} {}",
                            expected,
                            request.currency,
                            observed.round_dp(8).normalize(),
                            request.currency
                        ));
                    }
                }
            }
        }

        if let Some(expected) = &request.expected_recipient {
            match &result.raw_recipient {
                None => reasons.push("no recipient was observed".to_string()),
                Some(observed) if !recipients_match(expected, observed) => {
                    reasons.push(format!("recipient mismatch: expected {}, observed {}", expected, observed));
                }
                Some(_) => {}
            }
        }

        let verified = reasons.is_empty();
        if !verified {
            tracing::warn!(
                reference = %result.handle.external_reference,
                network = %result.handle.network,
                reasons = ?reasons,
                "Settlement did not verify"
            );
        }

        VerificationOutcome {
            handle: result.handle.clone(),
            verified,
            reason_if_unverified: (!verified).then(|| reasons.join("; ")),
            normalized_amount: normalized_amount.and_then(Result::ok),
            normalized_recipient: result.raw_recipient.as_deref().map(normalize_recipient),
        }
    }
}

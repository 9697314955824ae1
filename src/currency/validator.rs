//! Amount validation against per-method minimums.

use arc_swap::ArcSwap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::currency::types::{format_amount, Currency};

/// How a donation is settled, for minimum-amount purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card processor (Stripe).
    Card,
    /// Crypto settlement: hosted charges and direct wallet transfers.
    CryptoProcessor,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::CryptoProcessor => "crypto_processor",
        }
    }
}

/// Minimum accepted amount per (method, currency).
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumTable {
    card: HashMap<Currency, Decimal>,
    crypto: HashMap<Currency, Decimal>,
}

impl Default for MinimumTable {
    fn default() -> Self {
        let card = [
            ("USD", Decimal::new(50, 2)),
            ("EUR", Decimal::new(50, 2)),
            ("GBP", Decimal::new(30, 2)),
            ("KRW", Decimal::from(500)),
            ("JPY", Decimal::from(50)),
        ];
        let crypto = [
            ("USD", Decimal::ONE),
            ("USDC", Decimal::ONE),
            ("ETH", Decimal::new(1, 3)),
            ("BTC", Decimal::new(1, 4)),
            ("SOL", Decimal::new(1, 2)),
        ];
        Self {
            card: card.into_iter().map(|(c, m)| (Currency::from(c), m)).collect(),
            crypto: crypto.into_iter().map(|(c, m)| (Currency::from(c), m)).collect(),
        }
    }
}

impl MinimumTable {
    /// Built-in minimums with config overrides applied on top.
    pub fn with_overrides(
        card: &HashMap<String, Decimal>,
        crypto_processor: &HashMap<String, Decimal>,
    ) -> Self {
        let mut table = Self::default();
        for (code, min) in card {
            table.card.insert(Currency::new(code), *min);
        }
        for (code, min) in crypto_processor {
            table.crypto.insert(Currency::new(code), *min);
        }
        table
    }

    /// Minimum for the pair; unknown currencies have no minimum.
    pub fn minimum_for(&self, currency: &Currency, method: PaymentMethod) -> Decimal {
        let table = match method {
            PaymentMethod::Card => &self.card,
            PaymentMethod::CryptoProcessor => &self.crypto,
        };
        table.get(currency).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Structured validation verdict. Invalid input never produces an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            valid: false,
            error: Some(message),
        }
    }
}

#[derive(Debug)]
pub struct PaymentValidator {
    minimums: ArcSwap<MinimumTable>,
}

impl Default for PaymentValidator {
    fn default() -> Self {
        Self::new(MinimumTable::default())
    }
}

impl PaymentValidator {
    pub fn new(minimums: MinimumTable) -> Self {
        Self {
            minimums: ArcSwap::from_pointee(minimums),
        }
    }

    pub fn reload(&self, minimums: MinimumTable) {
        tracing::info!("Minimum amount table reloaded");
        self.minimums.store(Arc::new(minimums));
    }

    pub fn minimum_for(&self, currency: &Currency, method: PaymentMethod) -> Decimal {
        self.minimums.load().minimum_for(currency, method)
    }

    pub fn validate_amount(
        &self,
        amount: Decimal,
        currency: &Currency,
        method: PaymentMethod,
    ) -> ValidationResult {
        if amount <= Decimal::ZERO {
            return ValidationResult::invalid("Amount must be greater than zero".to_string());
        }

        let minimum = self.minimum_for(currency, method);
        if amount < minimum {
            return ValidationResult::invalid(format!(
                "Minimum {} amount is {}",
                method.as_str(),
                format_amount(minimum, currency)
            ));
        }

        ValidationResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const METHODS: [PaymentMethod; 2] = [PaymentMethod::Card, PaymentMethod::CryptoProcessor];

    #[test]
    fn test_non_positive_amounts_always_invalid() {
        let validator = PaymentValidator::default();
        for method in METHODS {
            for code in ["USD", "ETH", "KRW", "UNKNOWN"] {
                for amount in [dec!(0), dec!(-1), dec!(-0.0001)] {
                    let result = validator.validate_amount(amount, &code.into(), method);
                    assert!(!result.valid, "{amount} {code} {method:?}");
                    assert!(result.error.is_some());
                }
            }
        }
    }

    #[test]
    fn test_minimum_boundary() {
        let validator = PaymentValidator::default();
        let epsilon = dec!(0.00000001);
        let pairs = [
            (PaymentMethod::Card, "USD"),
            (PaymentMethod::Card, "KRW"),
            (PaymentMethod::CryptoProcessor, "ETH"),
            (PaymentMethod::CryptoProcessor, "BTC"),
            (PaymentMethod::CryptoProcessor, "SOL"),
        ];
        for (method, code) in pairs {
            let currency = Currency::from(code);
            let minimum = validator.minimum_for(&currency, method);
            assert!(minimum > Decimal::ZERO);
            assert!(validator.validate_amount(minimum, &currency, method).valid);
            assert!(!validator.validate_amount(minimum - epsilon, &currency, method).valid);
        }
    }

    #[test]
    fn test_unknown_currency_has_no_minimum() {
        let validator = PaymentValidator::default();
        let result = validator.validate_amount(dec!(0.0000001), &"XYZ".into(), PaymentMethod::Card);
        assert!(result.valid);
    }

    #[test]
    fn test_error_mentions_minimum() {
        let validator = PaymentValidator::default();
        let result = validator.validate_amount(dec!(0.10), &"USD".into(), PaymentMethod::Card);
        assert_eq!(result.error.as_deref(), Some("Minimum card amount is 0.50 USD"));
    }

    #[test]
    fn test_reload_applies_overrides() {
        let validator = PaymentValidator::default();
        let mut card = HashMap::new();
        card.insert("usd".to_string(), dec!(5));
        validator.reload(MinimumTable::with_overrides(&card, &HashMap::new()));
        assert!(!validator.validate_amount(dec!(4.99), &"USD".into(), PaymentMethod::Card).valid);
    }
}

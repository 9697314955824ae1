//! Currency codes and their per-currency scale rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An upper-cased currency or crypto symbol (e.g. `USD`, `KRW`, `ETH`).
///
/// Codes are free-form on purpose: unknown codes must flow through the
/// converter and validator so their fallback rules can apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

/// Symbols treated as crypto denominations.
const CRYPTO_SYMBOLS: &[&str] = &["ETH", "BTC", "SOL", "MATIC", "POL", "BNB", "USDC", "USDT"];

/// Fiat currencies without a minor unit.
const ZERO_DECIMAL_FIAT: &[&str] = &["KRW", "JPY", "VND"];

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_crypto(&self) -> bool {
        CRYPTO_SYMBOLS.contains(&self.0.as_str())
    }

    /// Number of decimal places in the smallest unit a card processor charges.
    pub fn minor_unit_exponent(&self) -> u32 {
        if ZERO_DECIMAL_FIAT.contains(&self.0.as_str()) {
            0
        } else {
            2
        }
    }

    /// Absolute tolerance used when comparing an observed amount against an
    /// expected one in this currency.
    pub fn tolerance(&self) -> Decimal {
        match self.0.as_str() {
            "ETH" | "SOL" | "MATIC" | "POL" | "BNB" => Decimal::new(1, 3),
            "BTC" => Decimal::new(1, 5),
            "USDC" | "USDT" => Decimal::new(1, 2),
            _ if ZERO_DECIMAL_FIAT.contains(&self.0.as_str()) => Decimal::ONE,
            _ => Decimal::new(1, 2),
        }
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Self::new(&code)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert a decimal amount into processor minor units (cents for USD,
/// whole won for KRW). Returns `None` when the amount does not fit.
pub fn to_minor_units(amount: Decimal, currency: &Currency) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    let scale = Decimal::from(10i64.pow(currency.minor_unit_exponent()));
    amount.checked_mul(scale)?.round().to_i64()
}

/// Inverse of [`to_minor_units`].
pub fn from_minor_units(minor: i64, currency: &Currency) -> Decimal {
    Decimal::new(minor, currency.minor_unit_exponent())
}

/// Render an amount for logs and user messages (`1.50 USD`, `0.25 ETH`).
pub fn format_amount(amount: Decimal, currency: &Currency) -> String {
    let rendered = if currency.is_crypto() {
        amount.normalize().to_string()
    } else {
        let mut fixed = amount.round_dp(currency.minor_unit_exponent());
        fixed.rescale(currency.minor_unit_exponent());
        fixed.to_string()
    };
    format!("{} {}", rendered, currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_codes_are_normalized() {
        assert_eq!(Currency::new(" eth "), Currency::from("ETH"));
        assert_eq!(Currency::from("usd").to_string(), "USD");
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec!(12.34), &Currency::from("USD")), Some(1234));
        assert_eq!(to_minor_units(dec!(5000), &Currency::from("KRW")), Some(5000));
        assert_eq!(from_minor_units(1234, &Currency::from("USD")), dec!(12.34));
    }

    #[test]
    fn test_tolerance_by_scale() {
        assert_eq!(Currency::from("ETH").tolerance(), dec!(0.001));
        assert_eq!(Currency::from("SOL").tolerance(), dec!(0.001));
        assert_eq!(Currency::from("USD").tolerance(), dec!(0.01));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(1.5), &Currency::from("USD")), "1.50 USD");
        assert_eq!(format_amount(dec!(0.2500), &Currency::from("ETH")), "0.25 ETH");
    }

    #[test]
    fn test_serde_uses_plain_string() {
        let json = serde_json::to_string(&Currency::from("sol")).unwrap();
        assert_eq!(json, "\"SOL\"");
        let back: Currency = serde_json::from_str("\"krw\"").unwrap();
        assert_eq!(back.as_str(), "KRW");
    }
}

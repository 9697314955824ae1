//! Static-rate currency conversion.
//!
//! Rates are expressed as the USD value of one unit of each currency and
//! conversion pivots through USD. The table is held in an `ArcSwap` so a
//! config reload can replace it without blocking readers.

use arc_swap::ArcSwap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::currency::types::Currency;

/// USD value of one unit of each known currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    usd_rates: HashMap<Currency, Decimal>,
}

impl Default for RateTable {
    fn default() -> Self {
        let defaults = [
            ("USD", Decimal::ONE),
            ("KRW", Decimal::new(75, 5)),
            ("EUR", Decimal::new(108, 2)),
            ("JPY", Decimal::new(67, 4)),
            ("GBP", Decimal::new(127, 2)),
            ("USDC", Decimal::ONE),
            ("USDT", Decimal::ONE),
            ("ETH", Decimal::from(3000)),
            ("BTC", Decimal::from(60000)),
            ("SOL", Decimal::from(150)),
            ("MATIC", Decimal::new(70, 2)),
            ("BNB", Decimal::from(550)),
        ];
        Self {
            usd_rates: defaults
                .into_iter()
                .map(|(code, rate)| (Currency::from(code), rate))
                .collect(),
        }
    }
}

impl RateTable {
    /// Start from the built-in rates and apply overrides (e.g. from config).
    pub fn with_overrides(overrides: &HashMap<String, Decimal>) -> Self {
        let mut table = Self::default();
        for (code, rate) in overrides {
            table.usd_rates.insert(Currency::new(code), *rate);
        }
        table
    }

    /// USD value of one unit of `currency`, if known and positive.
    pub fn usd_rate(&self, currency: &Currency) -> Option<Decimal> {
        self.usd_rates
            .get(currency)
            .copied()
            .filter(|rate| *rate > Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.usd_rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usd_rates.is_empty()
    }
}

/// Raised when a pair could not be converted and the input was passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    pub from: Currency,
    pub to: Currency,
}

impl std::fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no conversion rate for {} -> {}; amount returned unchanged",
            self.from, self.to
        )
    }
}

/// Result of a conversion that also reports the pass-through fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: Decimal,
    pub warning: Option<ConversionWarning>,
}

/// Currency converter backed by a swappable [`RateTable`].
#[derive(Debug)]
pub struct Converter {
    table: ArcSwap<RateTable>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(RateTable::default())
    }
}

impl Converter {
    pub fn new(table: RateTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Replace the rate table (config hot reload).
    pub fn reload(&self, table: RateTable) {
        tracing::info!(currencies = table.len(), "Conversion rate table reloaded");
        self.table.store(Arc::new(table));
    }

    /// Convert `amount` between currencies.
    ///
    /// Unknown pairs return `amount` unchanged and log a warning.
    pub fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> Decimal {
        self.convert_checked(amount, from, to).amount
    }

    /// Like [`Converter::convert`] but hands the fallback warning back to the caller.
    pub fn convert_checked(&self, amount: Decimal, from: &Currency, to: &Currency) -> Conversion {
        if from == to {
            return Conversion {
                amount,
                warning: None,
            };
        }

        let table = self.table.load();
        let converted = match (table.usd_rate(from), table.usd_rate(to)) {
            (Some(from_rate), Some(to_rate)) => amount
                .checked_mul(from_rate)
                .and_then(|usd| usd.checked_div(to_rate)),
            _ => None,
        };

        match converted {
            Some(value) => Conversion {
                amount: value,
                warning: None,
            },
            None => {
                let warning = ConversionWarning {
                    from: from.clone(),
                    to: to.clone(),
                };
                tracing::warn!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    "Unknown conversion pair, returning amount unchanged"
                );
                Conversion {
                    amount,
                    warning: Some(warning),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_identity_for_same_currency() {
        let converter = Converter::default();
        for code in ["USD", "KRW", "ETH", "DOGE", "XYZ"] {
            let currency = Currency::from(code);
            assert_eq!(converter.convert(dec!(12.5), &currency, &currency), dec!(12.5));
        }
    }

    #[test]
    fn test_known_pair_pivots_through_usd() {
        let converter = Converter::default();
        let eth_in_usd = converter.convert(dec!(2), &"ETH".into(), &"USD".into());
        assert_eq!(eth_in_usd, dec!(6000));

        let usd_in_eth = converter.convert(dec!(1500), &"USD".into(), &"ETH".into());
        assert_eq!(usd_in_eth, dec!(0.5));
    }

    #[test]
    fn test_unknown_pair_passes_amount_through_with_warning() {
        let converter = Converter::default();
        let result = converter.convert_checked(dec!(42), &"DOGE".into(), &"USD".into());
        assert_eq!(result.amount, dec!(42));
        let warning = result.warning.expect("fallback must be reported");
        assert_eq!(warning.from.as_str(), "DOGE");
        assert!(warning.to_string().contains("unchanged"));

        // Plain convert never panics or errors on the same input.
        assert_eq!(converter.convert(dec!(42), &"USD".into(), &"DOGE".into()), dec!(42));
    }

    #[test]
    fn test_overrides_and_reload() {
        let mut overrides = HashMap::new();
        overrides.insert("eth".to_string(), dec!(2000));
        let converter = Converter::new(RateTable::with_overrides(&overrides));
        assert_eq!(converter.convert(dec!(1), &"ETH".into(), &"USD".into()), dec!(2000));

        converter.reload(RateTable::default());
        assert_eq!(converter.convert(dec!(1), &"ETH".into(), &"USD".into()), dec!(3000));
    }

    #[test]
    fn test_zero_rate_is_treated_as_unknown() {
        let mut overrides = HashMap::new();
        overrides.insert("SOL".to_string(), Decimal::ZERO);
        let converter = Converter::new(RateTable::with_overrides(&overrides));
        let result = converter.convert_checked(dec!(3), &"USD".into(), &"SOL".into());
        assert_eq!(result.amount, dec!(3));
        assert!(result.warning.is_some());
    }
}

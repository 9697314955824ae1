//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first, and validation runs before a config (initial or
//! reloaded) is accepted.

use rust_decimal::Decimal;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AppConfig, LedgerBackend};

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const COMMITMENTS: [&str; 3] = ["processed", "confirmed", "finalized"];

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = url::Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}

/// Validate `config`, returning every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    check_positive(&mut errors, "server.request_timeout_secs", config.server.request_timeout_secs);

    if config.admin.enabled && config.admin.resolved_api_key().trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty when the admin API is enabled"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {:?}", config.observability.log_level, LOG_LEVELS),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    check_positive(&mut errors, "confirmation.poll_interval_secs", config.confirmation.poll_interval_secs);
    check_positive(&mut errors, "confirmation.max_attempts", u64::from(config.confirmation.max_attempts));
    if let Some(timeout) = config.confirmation.timeout_secs {
        check_positive(&mut errors, "confirmation.timeout_secs", timeout);
    }

    match config.evm_networks() {
        Ok(networks) => {
            for (network, section) in networks {
                let prefix = format!("evm.{}", network);
                check_url(&mut errors, &format!("{}.rpc_url", prefix), &section.rpc_url);
                for (i, url) in section.failover_urls.iter().enumerate() {
                    check_url(&mut errors, &format!("{}.failover_urls[{}]", prefix, i), url);
                }
                check_positive(&mut errors, &format!("{}.chain_id", prefix), section.chain_id);
                check_positive(&mut errors, &format!("{}.rpc_timeout_secs", prefix), section.rpc_timeout_secs);
                check_positive(
                    &mut errors,
                    &format!("{}.required_confirmations", prefix),
                    section.required_confirmations,
                );
            }
        }
        Err(message) => errors.push(ValidationError::new("evm", message)),
    }

    if config.solana.enabled {
        check_url(&mut errors, "solana.rpc_url", &config.solana.rpc_url);
        if !COMMITMENTS.contains(&config.solana.commitment.as_str()) {
            errors.push(ValidationError::new(
                "solana.commitment",
                format!("'{}' is not one of {:?}", config.solana.commitment, COMMITMENTS),
            ));
        }
        check_positive(&mut errors, "solana.rpc_timeout_secs", config.solana.rpc_timeout_secs);
        check_positive(
            &mut errors,
            "solana.required_confirmations",
            config.solana.required_confirmations,
        );
    }

    if config.stripe.enabled {
        check_url(&mut errors, "stripe.api_base", &config.stripe.api_base);
    }
    if config.coinbase.enabled {
        check_url(&mut errors, "coinbase.api_base", &config.coinbase.api_base);
    }

    if config.ledger.backend == LedgerBackend::Supabase {
        if config.ledger.supabase_url.trim().is_empty() {
            errors.push(ValidationError::new("ledger.supabase_url", "required for the supabase backend"));
        } else {
            check_url(&mut errors, "ledger.supabase_url", &config.ledger.supabase_url);
        }
    }
    if config.ledger.table.trim().is_empty() {
        errors.push(ValidationError::new("ledger.table", "must not be empty"));
    }

    check_positive(&mut errors, "refunds.max_days", u64::from(config.refunds.max_days));

    for (currency, rate) in &config.rates {
        if *rate <= Decimal::ZERO {
            errors.push(ValidationError::new(format!("rates.{}", currency), "must be greater than zero"));
        }
    }
    for (table, minimums) in [
        ("card", &config.minimums.card),
        ("crypto_processor", &config.minimums.crypto_processor),
    ] {
        for (currency, minimum) in minimums {
            if minimum.is_sign_negative() {
                errors.push(ValidationError::new(
                    format!("minimums.{}.{}", table, currency),
                    "must not be negative",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let raw = r#"
            [server]
            bind_address = "nowhere"

            [confirmation]
            poll_interval_secs = 0

            [evm.ethereum]
            rpc_url = "not a url"
            chain_id = 0

            [ledger]
            backend = "supabase"

            [solana]
            enabled = true
            required_confirmations = 0

            [rates]
            ETH = "-1"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"server.bind_address"));
        assert!(fields.contains(&"confirmation.poll_interval_secs"));
        assert!(fields.contains(&"evm.ethereum.rpc_url"));
        assert!(fields.contains(&"evm.ethereum.chain_id"));
        assert!(fields.contains(&"ledger.supabase_url"));
        assert!(fields.contains(&"rates.ETH"));
        assert!(fields.contains(&"solana.required_confirmations"));
    }

    #[test]
    fn test_unknown_evm_section() {
        let config: AppConfig = toml::from_str("[evm.arbitrum]\nchain_id = 42161").unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "evm");
    }
}

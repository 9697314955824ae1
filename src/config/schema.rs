//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the donation
//! service. All types derive Serde traits for deserialization from TOML.
//! Secrets (API keys, private keys) are never part of the file; they are read
//! from the environment variables named here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::chain::Network;

/// Environment variable holding the admin API bearer token.
pub const ADMIN_API_KEY_ENV: &str = "BUSAN_ADMIN_API_KEY";
/// Environment variable holding the Stripe secret key.
pub const STRIPE_SECRET_KEY_ENV: &str = "STRIPE_SECRET_KEY";
/// Environment variable holding the Coinbase Commerce API key.
pub const COINBASE_API_KEY_ENV: &str = "COINBASE_COMMERCE_API_KEY";
/// Environment variable holding the Supabase service-role key.
pub const SUPABASE_KEY_ENV: &str = "SUPABASE_SERVICE_KEY";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Admin API listener.
    pub server: ServerConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,

    /// Confirmation polling behaviour.
    pub confirmation: ConfirmationConfig,

    /// EVM networks keyed by name (`[evm.ethereum]`, `[evm.polygon]`, ...).
    pub evm: BTreeMap<String, EvmNetworkConfig>,

    pub solana: SolanaConfig,

    pub stripe: StripeConfig,

    pub coinbase: CoinbaseConfig,

    pub ledger: LedgerConfig,

    pub refunds: RefundConfig,

    /// USD value of one unit per currency code; overrides built-in rates.
    pub rates: HashMap<String, Decimal>,

    pub minimums: MinimumsConfig,
}

impl AppConfig {
    /// EVM sections resolved to networks. Unknown or non-EVM keys are errors.
    pub fn evm_networks(&self) -> Result<Vec<(Network, &EvmNetworkConfig)>, String> {
        self.evm
            .iter()
            .map(|(name, section)| match name.parse::<Network>() {
                Ok(network) if network.is_evm() => Ok((network, section)),
                Ok(network) => Err(format!("[evm.{}] is not an EVM network", network)),
                Err(e) => Err(e.to_string()),
            })
            .collect()
    }
}

/// Admin API listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Admin API authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Bearer token. `BUSAN_ADMIN_API_KEY` takes precedence when set.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

impl AdminConfig {
    /// API key with the environment override applied.
    pub fn resolved_api_key(&self) -> String {
        std::env::var(ADMIN_API_KEY_ENV).unwrap_or_else(|_| self.api_key.clone())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Seconds between EVM RPC health checks; 0 disables them.
    pub rpc_health_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            rpc_health_interval_secs: 30,
        }
    }
}

/// Confirmation waiter settings shared by all networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Fixed interval between polls in seconds.
    pub poll_interval_secs: u64,

    /// Maximum number of polls before giving up with `TimedOut`.
    pub max_attempts: u32,

    /// Optional wall-clock budget in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_attempts: 60,
            timeout_secs: None,
        }
    }
}

/// One EVM-family network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvmNetworkConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (1 mainnet, 137 Polygon, 56 BSC, 11155111 Sepolia).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Confirmations required before a transfer counts as confirmed.
    pub required_confirmations: u64,
}

impl Default for EvmNetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            required_confirmations: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolanaConfig {
    pub enabled: bool,

    pub rpc_url: String,

    /// Commitment passed to `getTransaction` ("confirmed" or "finalized").
    pub commitment: String,

    pub rpc_timeout_secs: u64,

    /// Slots a transaction must be buried under. Above 1 the tip is read
    /// with `getSlot` on each poll.
    pub required_confirmations: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            rpc_timeout_secs: 10,
            required_confirmations: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StripeConfig {
    pub enabled: bool,

    pub api_base: String,

    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.stripe.com".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoinbaseConfig {
    pub enabled: bool,

    pub api_base: String,

    pub timeout_secs: u64,
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.commerce.coinbase.com".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Which ledger store backs the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    Memory,
    Supabase,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,

    /// JSON snapshot file for the in-memory store.
    pub persistence_path: Option<String>,

    /// Supabase project URL (e.g. https://xyz.supabase.co).
    pub supabase_url: String,

    /// Donations table.
    pub table: String,

    /// Manual refund request table.
    pub refund_table: String,

    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            persistence_path: None,
            supabase_url: String::new(),
            table: "donations".to_string(),
            refund_table: "refund_requests".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefundConfig {
    /// Maximum donation age in days for a refund.
    pub max_days: u32,
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self { max_days: 30 }
    }
}

/// Minimum amount overrides per payment method.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MinimumsConfig {
    pub card: HashMap<String, Decimal>,

    pub crypto_processor: HashMap<String, Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.confirmation.poll_interval_secs, 5);
        assert_eq!(config.refunds.max_days, 30);
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert!(config.evm.is_empty());
    }

    #[test]
    fn test_non_evm_section_is_rejected() {
        let config: AppConfig = toml::from_str("[evm.solana]\nchain_id = 1").unwrap();
        assert!(config.evm_networks().unwrap_err().contains("not an EVM network"));
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            [confirmation]
            poll_interval_secs = 2
            max_attempts = 10
            timeout_secs = 120

            [evm.polygon]
            rpc_url = "https://polygon-rpc.com"
            chain_id = 137
            required_confirmations = 3

            [solana]
            enabled = true
            rpc_url = "https://api.devnet.solana.com"

            [ledger]
            backend = "supabase"
            supabase_url = "https://example.supabase.co"

            [rates]
            ETH = "2500"

            [minimums.card]
            USD = "1.00"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        let networks = config.evm_networks().unwrap();
        let (network, polygon) = networks[0];
        assert_eq!(network, Network::Polygon);
        assert_eq!(polygon.chain_id, 137);
        assert_eq!(polygon.required_confirmations, 3);
        assert_eq!(polygon.rpc_timeout_secs, 10);
        assert!(config.solana.enabled);
        assert_eq!(config.ledger.backend, LedgerBackend::Supabase);
        assert_eq!(config.rates["ETH"], Decimal::from(2500));
        assert_eq!(config.minimums.card["USD"], Decimal::ONE);
        assert_eq!(config.confirmation.timeout_secs, Some(120));
    }
}

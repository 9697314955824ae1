//! EVM-family RPC client with timeout and failover.
//!
//! # Responsibilities
//! - Connect to a primary JSON-RPC endpoint plus optional failovers
//! - Look up transactions and receipts by hash ("not found" is `None`)
//! - Report transport failures as `ChainError::Unavailable`
//! - Convert between wei and decimal amounts

use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Transaction, TransactionReceipt};
use rust_decimal::Decimal;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::chain::types::{ChainError, ChainResult, Network};
use crate::config::EvmNetworkConfig;
use crate::observability::metrics;

/// Decimals of the native asset on every supported EVM network.
pub const NATIVE_DECIMALS: u8 = 18;

/// RPC client for one EVM network.
#[derive(Clone)]
pub struct EvmClient {
    network: Network,
    /// Primary provider first, then failovers.
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    config: EvmNetworkConfig,
    timeout_duration: Duration,
}

impl EvmClient {
    /// Create a client for `network`.
    ///
    /// A chain ID mismatch or unreachable node is logged, not fatal: the
    /// confirmation waiter treats later RPC failures as transient.
    pub async fn new(network: Network, config: EvmNetworkConfig) -> ChainResult<Self> {
        if !network.is_evm() {
            return Err(ChainError::Config(format!("{} is not an EVM network", network)));
        }

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Config(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let mut providers = vec![
            Arc::new(ProviderBuilder::new().connect_http(primary_url)) as Arc<dyn Provider + Send + Sync>,
        ];

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(
                    Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>,
                ),
                Err(_) => tracing::warn!(network = %network, url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            network,
            providers,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            config,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                network = %network,
                chain_id = client.config.chain_id,
                "EVM client initialized"
            ),
            Err(e) => tracing::warn!(
                network = %network,
                error = %e,
                "EVM client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn required_confirmations(&self) -> u64 {
        self.config.required_confirmations
    }

    /// Run `call` against each provider in order until one answers.
    async fn with_failover<T, E, F, Fut>(&self, operation: &'static str, call: F) -> ChainResult<T>
    where
        F: Fn(Arc<dyn Provider + Send + Sync>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = "no RPC providers configured".to_string();

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(network = %self.network, provider_idx = i, operation, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(network = %self.network, provider_idx = i, operation, "RPC timeout, trying next provider");
                    last_error = format!("timeout after {}s", self.config.rpc_timeout_secs);
                }
            }
        }

        Err(ChainError::Unavailable {
            network: self.network,
            operation,
            reason: format!("all RPC providers failed: {}", last_error),
        })
    }

    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self
            .with_failover("get_chain_id", |p| async move { p.get_chain_id().await })
            .await?;
        if actual != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub async fn get_block_number(&self) -> ChainResult<u64> {
        self.with_failover("get_block_number", |p| async move { p.get_block_number().await })
            .await
    }

    /// Transaction by hash; `None` when the node has never seen it.
    pub async fn get_transaction(&self, hash: TxHash) -> ChainResult<Option<Transaction>> {
        self.with_failover("get_transaction", |p| async move {
            p.get_transaction_by_hash(hash).await
        })
        .await
    }

    /// Receipt by hash; `None` while the transaction is not mined.
    pub async fn get_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>> {
        self.with_failover("get_receipt", |p| async move {
            p.get_transaction_receipt(hash).await
        })
        .await
    }

    /// Check if the node is reachable and record the health gauge.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_block_number().await.is_ok();
        metrics::record_rpc_health(self.network.as_str(), healthy);
        healthy
    }
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("network", &self.network)
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Parse a `0x`-prefixed transaction hash.
pub fn parse_tx_hash(reference: &str) -> ChainResult<TxHash> {
    TxHash::from_str(reference.trim()).map_err(|_| ChainError::InvalidReference(reference.to_string()))
}

/// Confirmations of a transaction mined in `mined_in`, given the latest block.
/// Inclusion itself counts as the first confirmation.
pub fn confirmations_at(latest_block: u64, mined_in: Option<u64>) -> u64 {
    match mined_in {
        Some(block) if latest_block >= block => latest_block - block + 1,
        Some(_) => 1,
        None => 0,
    }
}

/// Base units (wei) to a decimal amount of the native asset.
pub fn wei_to_decimal(value: U256, decimals: u8) -> Option<Decimal> {
    let rendered = format_units(value, decimals).ok()?;
    Decimal::from_str(&rendered).ok()
}

/// Decimal amount of the native asset to base units (wei).
pub fn decimal_to_wei(amount: Decimal, decimals: u8) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let rounded = amount.round_dp(decimals as u32).normalize();
    parse_units(&rounded.to_string(), decimals)
        .ok()
        .map(|units| units.get_absolute())
}

//! Wallet signers and provider error classification.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::chain::evm::{decimal_to_wei, wei_to_decimal, NATIVE_DECIMALS};
use crate::chain::Network;
use crate::config::EvmNetworkConfig;
use crate::currency::Currency;

/// Environment variable name for the signer's private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "BUSAN_SIGNER_PRIVATE_KEY";

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// No wallet is available for this network.
    #[error("No wallet provider: {0}")]
    NoProvider(String),

    /// Any other provider-side refusal.
    #[error("Wallet provider error: {0}")]
    Provider(String),
}

pub type WalletResult<T> = Result<T, WalletError>;

/// A native transfer the wallet is asked to sign and broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub network: Network,
    pub to: String,
    /// Amount in the network's native currency.
    pub amount: Decimal,
    pub currency: Currency,
}

/// Map a wallet provider failure onto [`WalletError`].
///
/// Wallets report rejection as EIP-1193 code 4001 or with free text, so
/// both the code and the message are inspected.
pub fn classify_provider_error(code: Option<i64>, message: &str) -> WalletError {
    let lower = message.to_ascii_lowercase();
    if code == Some(USER_REJECTED_CODE)
        || lower.contains("user rejected")
        || lower.contains("user denied")
    {
        WalletError::UserRejected
    } else if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
        WalletError::InsufficientFunds(message.to_string())
    } else {
        WalletError::Provider(message.to_string())
    }
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Human-readable wallet kind ("local-evm", "metamask", "phantom").
    fn kind(&self) -> &str;

    /// Whether this signer can send on `network`.
    fn supports(&self, network: Network) -> bool;

    /// Accounts the wallet exposes; the first is used as the sender.
    async fn request_accounts(&self) -> WalletResult<Vec<String>>;

    /// Sign and broadcast `request`, returning the transaction reference.
    async fn sign_and_send(&self, request: &TransferRequest) -> WalletResult<String>;
}

/// Server-held EVM key sending native transfers through one RPC endpoint.
#[derive(Clone)]
pub struct LocalEvmSigner {
    signer: PrivateKeySigner,
    network: Network,
    rpc_url: url::Url,
    chain_id: u64,
    timeout_duration: Duration,
}

impl LocalEvmSigner {
    /// Create a signer from a hex-encoded private key (with or without 0x).
    pub fn from_private_key(
        private_key_hex: &str,
        network: Network,
        config: &EvmNetworkConfig,
    ) -> WalletResult<Self> {
        if !network.is_evm() {
            return Err(WalletError::NoProvider(format!("{} is not an EVM network", network)));
        }

        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| WalletError::Provider(format!("Invalid private key format: {}", e)))?;

        let rpc_url = config
            .rpc_url
            .parse()
            .map_err(|e| WalletError::Provider(format!("Invalid RPC URL '{}': {}", config.rpc_url, e)))?;

        tracing::info!(
            address = %signer.address(),
            network = %network,
            chain_id = config.chain_id,
            "Local signer initialized"
        );

        Ok(Self {
            signer,
            network,
            rpc_url,
            chain_id: config.chain_id,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
        })
    }

    /// Load the key from `BUSAN_SIGNER_PRIVATE_KEY`.
    pub fn from_env(network: Network, config: &EvmNetworkConfig) -> WalletResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            WalletError::NoProvider(format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR))
        })?;
        Self::from_private_key(&private_key, network, config)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    async fn send(&self, to: Address, request: &TransferRequest) -> WalletResult<String> {
        let value = decimal_to_wei(request.amount, NATIVE_DECIMALS)
            .ok_or_else(|| WalletError::Provider(format!("Amount {} cannot be sent", request.amount)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(self.rpc_url.clone());

        let balance = provider
            .get_balance(self.signer.address())
            .await
            .map_err(|e| classify_provider_error(None, &e.to_string()))?;
        if balance < value {
            let available = wei_to_decimal(balance, NATIVE_DECIMALS).unwrap_or_default();
            return Err(WalletError::InsufficientFunds(format!(
                "balance {} {} is below {} {}",
                available, request.currency, request.amount, request.currency
            )));
        }

        let tx = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(to)
            .with_value(value)
            .with_chain_id(self.chain_id);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_provider_error(None, &e.to_string()))?;

        Ok(format!("{:#x}", pending.tx_hash()))
    }
}

impl std::fmt::Debug for LocalEvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEvmSigner")
            .field("address", &self.signer.address())
            .field("network", &self.network)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for LocalEvmSigner {
    fn kind(&self) -> &str {
        "local-evm"
    }

    fn supports(&self, network: Network) -> bool {
        network == self.network
    }

    async fn request_accounts(&self) -> WalletResult<Vec<String>> {
        Ok(vec![self.signer.address().to_string()])
    }

    async fn sign_and_send(&self, request: &TransferRequest) -> WalletResult<String> {
        if !self.supports(request.network) {
            return Err(WalletError::NoProvider(format!(
                "signer is bound to {}, not {}",
                self.network, request.network
            )));
        }

        let to: Address = request
            .to
            .parse()
            .map_err(|_| WalletError::Provider(format!("Invalid recipient address '{}'", request.to)))?;

        let reference = timeout(self.timeout_duration, self.send(to, request))
            .await
            .map_err(|_| WalletError::Provider("timed out broadcasting transaction".to_string()))??;

        tracing::info!(
            network = %self.network,
            reference = %reference,
            to = %to,
            amount = %request.amount,
            "Transfer broadcast"
        );
        Ok(reference)
    }
}

//! Startup orchestration.
//!
//! Builds the donation service from a validated [`AppConfig`]: rate and
//! minimum tables, one adapter per enabled network, optional processors,
//! then the ledger store. Any error here is fatal.

use std::sync::Arc;
use thiserror::Error;

use crate::chain::{AdapterRegistry, ChainError, EvmAdapter, EvmClient, SolanaAdapter, SolanaClient};
use crate::config::{AppConfig, LedgerBackend, LedgerConfig};
use crate::currency::{Converter, MinimumTable, PaymentValidator, RateTable};
use crate::payments::waiter::WaiterConfig;
use crate::payments::{DonationService, LedgerStore, MemoryLedgerStore, StoreError, SupabaseLedgerStore};
use crate::processor::{
    CardProcessor, CardStatusAdapter, ChargeStatusAdapter, CoinbaseCommerce, CryptoChargeProcessor,
    ProcessorError, StripeClient,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("chain client: {0}")]
    Chain(#[from] ChainError),

    #[error("payment processor: {0}")]
    Processor(#[from] ProcessorError),

    #[error("ledger store: {0}")]
    Store(#[from] StoreError),

    #[error("configuration: {0}")]
    Config(String),
}

/// Everything `main` needs after startup.
pub struct Runtime {
    pub service: Arc<DonationService>,
    /// Kept for periodic health checks.
    pub evm_clients: Vec<EvmClient>,
}

pub fn build_store(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>, StartupError> {
    let store: Arc<dyn LedgerStore> = match config.backend {
        LedgerBackend::Memory => match &config.persistence_path {
            Some(path) => Arc::new(MemoryLedgerStore::load_from_file(path)?),
            None => {
                tracing::warn!("Ledger is in-memory only; records are lost on restart");
                Arc::new(MemoryLedgerStore::new(None))
            }
        },
        LedgerBackend::Supabase => Arc::new(SupabaseLedgerStore::from_env(config)?),
    };
    tracing::info!(backend = store.backend(), "Ledger store ready");
    Ok(store)
}

pub async fn build_runtime(config: &AppConfig) -> Result<Runtime, StartupError> {
    let converter = Arc::new(Converter::new(RateTable::with_overrides(&config.rates)));
    let validator = Arc::new(PaymentValidator::new(MinimumTable::with_overrides(
        &config.minimums.card,
        &config.minimums.crypto_processor,
    )));

    let mut adapters = AdapterRegistry::new();
    let mut evm_clients = Vec::new();

    for (network, section) in config.evm_networks().map_err(StartupError::Config)? {
        let client = EvmClient::new(network, section.clone()).await?;
        evm_clients.push(client.clone());
        adapters.register(Arc::new(EvmAdapter::new(client)));
    }

    if config.solana.enabled {
        adapters.register(Arc::new(SolanaAdapter::new(SolanaClient::new(&config.solana)?)));
    }

    let card: Option<Arc<dyn CardProcessor>> = if config.stripe.enabled {
        let stripe: Arc<dyn CardProcessor> = Arc::new(StripeClient::from_env(&config.stripe)?);
        adapters.register(Arc::new(CardStatusAdapter::new(stripe.clone())));
        Some(stripe)
    } else {
        None
    };

    let charges: Option<Arc<dyn CryptoChargeProcessor>> = if config.coinbase.enabled {
        let coinbase: Arc<dyn CryptoChargeProcessor> = Arc::new(CoinbaseCommerce::from_env(&config.coinbase)?);
        adapters.register(Arc::new(ChargeStatusAdapter::new(coinbase.clone())));
        Some(coinbase)
    } else {
        None
    };

    let store = build_store(&config.ledger)?;

    tracing::info!(networks = ?adapters.networks(), "Network adapters registered");

    let mut service = DonationService::new(
        validator,
        converter,
        adapters,
        store,
        WaiterConfig::from(&config.confirmation),
        config.refunds.max_days,
    );
    if let Some(card) = card {
        service = service.with_card_processor(card);
    }
    if let Some(charges) = charges {
        service = service.with_charge_processor(charges);
    }

    Ok(Runtime {
        service: Arc::new(service),
        evm_clients,
    })
}

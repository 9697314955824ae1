//! One status-polling capability per network.
//!
//! Every settlement path (EVM chains, Solana, card processor, hosted charge)
//! implements [`NetworkAdapter`]. The donation service picks the adapter once
//! from the request's [`Network`] and never branches on network names again.

use alloy::consensus::Transaction as _;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::evm::{confirmations_at, parse_tx_hash, wei_to_decimal, EvmClient, NATIVE_DECIMALS};
use crate::chain::solana::{lamports_to_sol, SolanaClient};
use crate::chain::types::{ChainError, ChainResult, Network, ObservedTransfer, PollStatus};

#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    fn network(&self) -> Network;

    /// Confirmations needed before a successful poll counts as confirmed.
    fn required_confirmations(&self) -> u64;

    /// Observe the current state of `reference`.
    async fn poll(&self, reference: &str) -> ChainResult<PollStatus>;

    fn explorer_url(&self, reference: &str) -> Option<String> {
        self.network().explorer_url(reference)
    }
}

/// Adapter over an [`EvmClient`].
#[derive(Debug, Clone)]
pub struct EvmAdapter {
    client: EvmClient,
}

impl EvmAdapter {
    pub fn new(client: EvmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkAdapter for EvmAdapter {
    fn network(&self) -> Network {
        self.client.network()
    }

    fn required_confirmations(&self) -> u64 {
        self.client.required_confirmations()
    }

    async fn poll(&self, reference: &str) -> ChainResult<PollStatus> {
        let hash = parse_tx_hash(reference)?;

        let receipt = match self.client.get_receipt(hash).await? {
            Some(receipt) => receipt,
            None => {
                // Not mined yet: distinguish "in mempool" from "never seen".
                return Ok(match self.client.get_transaction(hash).await? {
                    Some(_) => PollStatus::Pending { confirmations: 0 },
                    None => PollStatus::NotFound,
                });
            }
        };

        if !receipt.status() {
            return Ok(PollStatus::Failed {
                reason: "transaction reverted on-chain".to_string(),
            });
        }

        let latest_block = self.client.get_block_number().await?;
        let confirmations = confirmations_at(latest_block, receipt.block_number);
        let tx = self.client.get_transaction(hash).await?;

        let transfer = ObservedTransfer {
            amount: tx.as_ref().and_then(|t| wei_to_decimal(t.value(), NATIVE_DECIMALS)),
            currency: self.network().native_currency(),
            recipient: tx
                .as_ref()
                .and_then(|t| t.to())
                .or(receipt.to)
                .map(|address| address.to_string()),
            block_or_slot: receipt.block_number,
        };

        Ok(PollStatus::Succeeded {
            confirmations,
            transfer,
        })
    }
}

/// Adapter over a [`SolanaClient`]. A transaction returned at the configured
/// commitment is final, so it counts as one confirmation.
#[derive(Debug, Clone)]
pub struct SolanaAdapter {
    client: SolanaClient,
}

impl SolanaAdapter {
    pub fn new(client: SolanaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkAdapter for SolanaAdapter {
    fn network(&self) -> Network {
        Network::Solana
    }

    fn required_confirmations(&self) -> u64 {
        self.client.required_confirmations()
    }

    async fn poll(&self, reference: &str) -> ChainResult<PollStatus> {
        let tx = match self.client.get_transaction(reference).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return Ok(PollStatus::NotFound),
            // A JSON-RPC error for this signature is a failed lookup, not an outage.
            Err(ChainError::RpcRejected { code, message, .. }) => {
                return Ok(PollStatus::Failed {
                    reason: format!("RPC error {}: {}", code, message),
                })
            }
            Err(e) => return Err(e),
        };

        let receipt = tx.receipt();
        if let Some(error) = receipt.error {
            return Ok(PollStatus::Failed {
                reason: format!("transaction failed: {}", error),
            });
        }

        // A transaction returned at the configured commitment counts once;
        // deeper requirements are measured against the current slot.
        let confirmations = if self.client.required_confirmations() > 1 {
            let tip = self.client.get_slot().await?;
            tip.saturating_sub(receipt.slot) + 1
        } else {
            1
        };

        let transfer = tx.native_transfer();
        Ok(PollStatus::Succeeded {
            confirmations,
            transfer: ObservedTransfer {
                amount: transfer.as_ref().map(|t| lamports_to_sol(t.lamports)),
                currency: Network::Solana.native_currency(),
                recipient: transfer.map(|t| t.destination),
                block_or_slot: Some(receipt.slot),
            },
        })
    }
}

/// Adapters keyed by network, built once at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Network, Arc<dyn NetworkAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn NetworkAdapter>) {
        let network = adapter.network();
        if self.adapters.insert(network, adapter).is_some() {
            tracing::warn!(network = %network, "Replacing previously registered adapter");
        }
    }

    pub fn with(mut self, adapter: Arc<dyn NetworkAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, network: Network) -> Option<Arc<dyn NetworkAdapter>> {
        self.adapters.get(&network).cloned()
    }

    /// Registered networks in a stable order.
    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<_> = self.adapters.keys().copied().collect();
        networks.sort();
        networks
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("networks", &self.networks())
            .finish()
    }
}

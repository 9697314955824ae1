//! Periodic RPC health checks.
//!
//! Checks feed the `chain_rpc_healthy` gauge only. They never gate
//! submissions; the confirmation waiter already treats RPC failures as
//! transient.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::chain::evm::EvmClient;

pub struct RpcHealthMonitor {
    clients: Vec<EvmClient>,
    interval: Duration,
}

impl RpcHealthMonitor {
    pub fn new(clients: Vec<EvmClient>, interval: Duration) -> Self {
        Self { clients, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.clients.is_empty() || self.interval.is_zero() {
            tracing::info!("RPC health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            networks = self.clients.len(),
            "RPC health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all().await,
                _ = shutdown.recv() => {
                    tracing::info!("RPC health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        for client in &self.clients {
            if !client.is_healthy().await {
                tracing::warn!(network = %client.network(), "RPC health check failed");
            }
        }
    }
}

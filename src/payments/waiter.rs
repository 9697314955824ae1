//! Confirmation waiter.
//!
//! ```text
//! Submitted → Polling → { Confirmed | Failed | TimedOut }
//!                 └── cancelled (stops polling only)
//! ```
//!
//! Polls one [`NetworkAdapter`] at a fixed interval. Transient errors are
//! logged and the next tick simply asks again; there is no backoff. Running
//! out of attempts (or the optional wall-clock budget) is `TimedOut`, which
//! is not a failure: the handle can be re-queried later.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::chain::{NetworkAdapter, ObservedTransfer, PollStatus};
use crate::config::ConfirmationConfig;
use crate::observability::metrics;
use crate::payments::types::{ConfirmationResult, TerminalState, TransactionHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub timeout: Option<Duration>,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self::from(&ConfirmationConfig::default())
    }
}

impl From<&ConfirmationConfig> for WaiterConfig {
    fn from(config: &ConfirmationConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_attempts: config.max_attempts.max(1),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Observable progress of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Submitted,
    Polling { attempt: u32, confirmations: u64 },
    Finished(TerminalState),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Finished(ConfirmationResult),
    /// Cancelled before a terminal state. Nothing was unwound.
    Cancelled { handle: TransactionHandle, attempts: u32 },
}

/// A confirmation wait running on its own task.
#[derive(Debug)]
pub struct ConfirmationTask {
    handle: TransactionHandle,
    cancel: CancellationToken,
    state: watch::Receiver<WaitState>,
    join: JoinHandle<WaitOutcome>,
}

impl ConfirmationTask {
    pub fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    /// Stop polling. The broadcast transaction is unaffected.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> WaitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WaitState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to end.
    pub async fn outcome(self) -> WaitOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(reference = %self.handle.external_reference, error = %e, "Confirmation task aborted");
                WaitOutcome::Cancelled {
                    handle: self.handle,
                    attempts: 0,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationWaiter {
    config: WaiterConfig,
}

#[derive(Default)]
struct Observed {
    confirmations: u64,
    transfer: Option<ObservedTransfer>,
}

impl ConfirmationWaiter {
    pub fn new(config: WaiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WaiterConfig {
        &self.config
    }

    /// Run the wait on a new task.
    pub fn spawn(
        &self,
        adapter: Arc<dyn NetworkAdapter>,
        handle: TransactionHandle,
        cancel: CancellationToken,
    ) -> ConfirmationTask {
        let (state_tx, state_rx) = watch::channel(WaitState::Submitted);
        let waiter = self.clone();
        let task_handle = handle.clone();
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            waiter
                .wait_with_state(adapter, task_handle, task_cancel, Some(state_tx))
                .await
        });

        ConfirmationTask {
            handle,
            cancel,
            state: state_rx,
            join,
        }
    }

    /// Poll until a terminal state or cancellation.
    pub async fn wait(
        &self,
        adapter: Arc<dyn NetworkAdapter>,
        handle: TransactionHandle,
        cancel: CancellationToken,
    ) -> WaitOutcome {
        self.wait_with_state(adapter, handle, cancel, None).await
    }

    async fn wait_with_state(
        &self,
        adapter: Arc<dyn NetworkAdapter>,
        handle: TransactionHandle,
        cancel: CancellationToken,
        state: Option<watch::Sender<WaitState>>,
    ) -> WaitOutcome {
        let publish = |s: WaitState| {
            if let Some(tx) = &state {
                tx.send_replace(s);
            }
        };

        let network = adapter.network();
        let reference = handle.external_reference.clone();
        let required = adapter.required_confirmations().max(1);
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut observed = Observed::default();
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(network = %network, reference = %reference, attempts, "Confirmation wait cancelled");
                    publish(WaitState::Cancelled);
                    return WaitOutcome::Cancelled { handle, attempts };
                }
                _ = sleep_until_deadline(deadline) => {
                    tracing::info!(network = %network, reference = %reference, attempts, "Confirmation wall-clock budget spent");
                    break;
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            publish(WaitState::Polling {
                attempt: attempts,
                confirmations: observed.confirmations,
            });

            let poll = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    publish(WaitState::Cancelled);
                    return WaitOutcome::Cancelled { handle, attempts };
                }
                poll = adapter.poll(&reference) => poll,
            };

            match poll {
                Ok(PollStatus::NotFound) => {
                    metrics::record_confirmation_poll(network.as_str(), "not_found");
                    tracing::debug!(network = %network, reference = %reference, attempt = attempts, "Transaction not found yet");
                }
                Ok(PollStatus::Pending { confirmations }) => {
                    metrics::record_confirmation_poll(network.as_str(), "pending");
                    observed.confirmations = confirmations;
                    tracing::debug!(network = %network, reference = %reference, attempt = attempts, confirmations, "Transaction pending");
                }
                Ok(PollStatus::Succeeded { confirmations, transfer }) => {
                    metrics::record_confirmation_poll(network.as_str(), "succeeded");
                    observed.confirmations = confirmations;
                    observed.transfer = Some(transfer);
                    if confirmations >= required {
                        return self.finish(handle, TerminalState::Confirmed, observed, None, attempts, started, &publish);
                    }
                    tracing::debug!(
                        network = %network,
                        reference = %reference,
                        confirmations,
                        required,
                        "Waiting for confirmations"
                    );
                }
                Ok(PollStatus::Failed { reason }) => {
                    metrics::record_confirmation_poll(network.as_str(), "failed");
                    return self.finish(handle, TerminalState::Failed, observed, Some(reason), attempts, started, &publish);
                }
                Err(e) if e.is_transient() => {
                    metrics::record_confirmation_poll(network.as_str(), "unavailable");
                    tracing::warn!(network = %network, reference = %reference, attempt = attempts, error = %e, "Status poll failed, retrying next tick");
                }
                Err(e) => {
                    metrics::record_confirmation_poll(network.as_str(), "error");
                    return self.finish(handle, TerminalState::Failed, observed, Some(e.to_string()), attempts, started, &publish);
                }
            }
        }

        self.finish(handle, TerminalState::TimedOut, observed, None, attempts, started, &publish)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        handle: TransactionHandle,
        terminal_state: TerminalState,
        observed: Observed,
        failure_reason: Option<String>,
        attempts: u32,
        started: Instant,
        publish: &impl Fn(WaitState),
    ) -> WaitOutcome {
        let network = handle.network;
        metrics::record_wait_duration(network.as_str(), started.elapsed());
        tracing::info!(
            network = %network,
            reference = %handle.external_reference,
            state = ?terminal_state,
            attempts,
            confirmations = observed.confirmations,
            "Confirmation wait finished"
        );
        publish(WaitState::Finished(terminal_state));

        let transfer = observed.transfer.unwrap_or_default();
        WaitOutcome::Finished(ConfirmationResult {
            handle,
            terminal_state,
            confirmations: observed.confirmations,
            block_or_slot: transfer.block_or_slot,
            raw_amount: transfer.amount,
            raw_currency: transfer.currency,
            raw_recipient: transfer.recipient,
            failure_reason,
            attempts,
        })
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

//! The donation pipeline: validate → submit → wait → verify → record.
//!
//! `donate` never returns `Err`. Every outcome is folded into a
//! [`DonationReceipt`]; once a handle exists, `success` stays true unless the
//! network itself reported the transaction as failed.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::chain::{AdapterRegistry, NetworkAdapter, NetworkFamily};
use crate::currency::{Converter, PaymentValidator};
use crate::observability::metrics;
use crate::payments::ledger::{LedgerFilter, LedgerRecorder, LedgerStore, StoreError};
use crate::payments::refund::{RefundEligibility, RefundManager};
use crate::payments::submitter::Submitter;
use crate::payments::types::{
    ConfirmationResult, DonationError, DonationReceipt, DonationRequest, LedgerEntry, LedgerStatus,
    NewLedgerRecord, PaymentInstrument, RefundOptions, RefundReceipt, RefundRequest, TerminalState,
    TransactionHandle,
};
use crate::payments::verifier::Verifier;
use crate::payments::waiter::{ConfirmationTask, ConfirmationWaiter, WaitOutcome, WaiterConfig};
use crate::processor::{CardProcessor, CryptoChargeProcessor};

pub struct DonationService {
    validator: Arc<PaymentValidator>,
    converter: Arc<Converter>,
    adapters: AdapterRegistry,
    submitter: Submitter,
    waiter: ConfirmationWaiter,
    verifier: Verifier,
    recorder: LedgerRecorder,
    refunds: RefundManager,
}

impl DonationService {
    pub fn new(
        validator: Arc<PaymentValidator>,
        converter: Arc<Converter>,
        adapters: AdapterRegistry,
        store: Arc<dyn LedgerStore>,
        waiter: WaiterConfig,
        refund_max_days: u32,
    ) -> Self {
        Self {
            submitter: Submitter::new(converter.clone()),
            verifier: Verifier::new(converter.clone()),
            waiter: ConfirmationWaiter::new(waiter),
            recorder: LedgerRecorder::new(store.clone()),
            refunds: RefundManager::new(store, refund_max_days),
            validator,
            converter,
            adapters,
        }
    }

    pub fn with_card_processor(mut self, processor: Arc<dyn CardProcessor>) -> Self {
        self.submitter = self.submitter.with_card_processor(processor.clone());
        self.refunds = self.refunds.with_card_processor(processor);
        self
    }

    pub fn with_charge_processor(mut self, processor: Arc<dyn CryptoChargeProcessor>) -> Self {
        self.submitter = self.submitter.with_charge_processor(processor);
        self
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn validator(&self) -> &Arc<PaymentValidator> {
        &self.validator
    }

    pub fn converter(&self) -> &Arc<Converter> {
        &self.converter
    }

    pub fn ledger(&self) -> &LedgerRecorder {
        &self.recorder
    }

    pub fn refunds(&self) -> &RefundManager {
        &self.refunds
    }

    /// Pre-flight checks. Nothing here touches the network.
    pub fn validate_request(&self, request: &DonationRequest) -> Result<(), DonationError> {
        if request.payer.trim().is_empty() {
            return Err(DonationError::Validation("A payer is required".to_string()));
        }

        let result = self
            .validator
            .validate_amount(request.amount, &request.currency, request.method());
        if !result.valid {
            return Err(DonationError::Validation(
                result.error.unwrap_or_else(|| "Invalid amount".to_string()),
            ));
        }

        if matches!(request.network.family(), NetworkFamily::Evm | NetworkFamily::Solana) {
            let recipient = request
                .recipient
                .as_deref()
                .ok_or_else(|| DonationError::Validation("A recipient address is required".to_string()))?;
            if !request.network.validate_recipient(recipient) {
                return Err(DonationError::Validation(format!(
                    "'{}' is not a valid {} address",
                    recipient, request.network
                )));
            }
        }

        Ok(())
    }

    fn adapter_for(&self, request: &DonationRequest) -> Result<Arc<dyn NetworkAdapter>, DonationError> {
        self.adapters
            .get(request.network)
            .ok_or_else(|| DonationError::Config(format!("{} is not enabled", request.network)))
    }

    /// Run the whole pipeline. Wallet donations stop waiting when the
    /// wallet session is disposed.
    pub async fn donate(&self, request: &DonationRequest, instrument: &PaymentInstrument) -> DonationReceipt {
        let cancel = match instrument {
            PaymentInstrument::Wallet(session) => session.child_token(),
            _ => CancellationToken::new(),
        };
        self.donate_cancellable(request, instrument, cancel).await
    }

    pub async fn donate_cancellable(
        &self,
        request: &DonationRequest,
        instrument: &PaymentInstrument,
        cancel: CancellationToken,
    ) -> DonationReceipt {
        let network = request.network;

        let adapter = match self.validate_request(request).and_then(|_| self.adapter_for(request)) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::info!(network = %network, payer = %request.payer, error = %e, "Donation rejected before submission");
                metrics::record_donation(network.as_str(), "invalid");
                return DonationReceipt::rejected(e);
            }
        };

        let handle = match self.submitter.submit(request, instrument).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::info!(network = %network, payer = %request.payer, error = %e, "Donation submission failed");
                metrics::record_donation(network.as_str(), "not_submitted");
                return DonationReceipt::rejected(e);
            }
        };

        let outcome = self.waiter.wait(adapter.clone(), handle.clone(), cancel).await;
        self.settle(request, adapter.as_ref(), handle, outcome).await
    }

    /// Start waiting on `handle` in the background.
    pub fn start_confirmation(
        &self,
        handle: TransactionHandle,
        cancel: CancellationToken,
    ) -> Result<ConfirmationTask, DonationError> {
        let adapter = self
            .adapters
            .get(handle.network)
            .ok_or_else(|| DonationError::Config(format!("{} is not enabled", handle.network)))?;
        Ok(self.waiter.spawn(adapter, handle, cancel))
    }

    /// Re-query an existing handle (e.g. after `ConfirmationTimedOut`) and
    /// finish the pipeline for it. Nothing is submitted.
    pub async fn resume(
        &self,
        request: &DonationRequest,
        handle: TransactionHandle,
        cancel: CancellationToken,
    ) -> DonationReceipt {
        let adapter = match self.adapters.get(handle.network) {
            Some(adapter) => adapter,
            None => {
                let mut receipt =
                    DonationReceipt::rejected(DonationError::Config(format!("{} is not enabled", handle.network)));
                receipt.success = true;
                receipt.handle = Some(handle);
                return receipt;
            }
        };
        let outcome = self.waiter.wait(adapter.clone(), handle.clone(), cancel).await;
        self.settle(request, adapter.as_ref(), handle, outcome).await
    }

    async fn settle(
        &self,
        request: &DonationRequest,
        adapter: &dyn NetworkAdapter,
        handle: TransactionHandle,
        outcome: WaitOutcome,
    ) -> DonationReceipt {
        let network = handle.network;
        let reference = handle.external_reference.clone();
        let explorer_url = adapter.explorer_url(&reference);

        let mut receipt = DonationReceipt {
            success: true,
            handle: Some(handle.clone()),
            verified: false,
            ledger_entry: None,
            confirmation: None,
            explorer_url,
            error: None,
        };

        let result = match outcome {
            WaitOutcome::Cancelled { .. } => {
                metrics::record_donation(network.as_str(), "abandoned");
                receipt.error = Some(DonationError::ConfirmationAbandoned { reference });
                return receipt;
            }
            WaitOutcome::Finished(result) => result,
        };

        let (status, error, outcome_label) = match result.terminal_state {
            TerminalState::TimedOut => (
                LedgerStatus::Pending,
                Some(DonationError::ConfirmationTimedOut {
                    reference: reference.clone(),
                    network,
                    attempts: result.attempts,
                }),
                "timed_out",
            ),
            TerminalState::Failed => {
                receipt.success = false;
                (
                    LedgerStatus::Failed,
                    Some(DonationError::TransactionFailed {
                        reference: reference.clone(),
                        reason: result
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "rejected by the network".to_string()),
                    }),
                    "failed",
                )
            }
            TerminalState::Confirmed => self.verify(request, &result, &mut receipt),
        };

        receipt.error = error;
        receipt.confirmation = Some(result);

        match self
            .recorder
            .record(NewLedgerRecord::from_request(request, &handle, status))
            .await
        {
            Ok(entry) => receipt.ledger_entry = Some(entry),
            // PersistenceFailed claims the payment succeeded; only a verified
            // confirmation may say so. Other outcomes keep their own error.
            Err(e) if receipt.error.is_some() => {
                tracing::warn!(
                    reference = %handle.external_reference,
                    status = %status,
                    error = %e,
                    "Donation outcome was not recorded"
                );
            }
            Err(e) => receipt.error = Some(e),
        }

        metrics::record_donation(network.as_str(), outcome_label);
        tracing::info!(
            network = %network,
            reference = %handle.external_reference,
            status = %status,
            verified = receipt.verified,
            success = receipt.success,
            "Donation settled"
        );
        receipt
    }

    fn verify(
        &self,
        request: &DonationRequest,
        result: &ConfirmationResult,
        receipt: &mut DonationReceipt,
    ) -> (LedgerStatus, Option<DonationError>, &'static str) {
        let verification = self.verifier.verify(result, request);
        receipt.verified = verification.verified;
        if verification.verified {
            (LedgerStatus::Confirmed, None, "confirmed")
        } else {
            (
                LedgerStatus::Pending,
                Some(DonationError::VerificationMismatch {
                    reference: result.handle.external_reference.clone(),
                    reason: verification
                        .reason_if_unverified
                        .unwrap_or_else(|| "verification failed".to_string()),
                }),
                "unverified",
            )
        }
    }

    pub async fn refund(&self, entry: &LedgerEntry, options: RefundOptions) -> RefundReceipt {
        self.refunds.refund(entry, options).await
    }

    pub fn refund_eligibility(&self, entry: &LedgerEntry) -> RefundEligibility {
        self.refunds.can_refund(entry)
    }

    pub async fn ledger_entry(&self, reference: &str) -> Result<Option<LedgerEntry>, StoreError> {
        self.recorder.get(reference).await
    }

    pub async fn ledger_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        self.recorder.list(filter).await
    }

    pub async fn refund_requests(&self) -> Result<Vec<RefundRequest>, StoreError> {
        self.recorder.store().list_refund_requests().await
    }
}

impl std::fmt::Debug for DonationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonationService")
            .field("adapters", &self.adapters)
            .field("submitter", &self.submitter)
            .field("recorder", &self.recorder)
            .field("refunds", &self.refunds)
            .finish()
    }
}

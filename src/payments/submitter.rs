//! Transaction submission: wallet transfer, card payment or hosted charge.
//!
//! The submitter never retries. Every successful call yields a fresh
//! [`TransactionHandle`]; a broadcast handle says nothing about confirmation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{Network, NetworkFamily};
use crate::currency::{to_minor_units, Converter};
use crate::payments::types::{DonationError, DonationRequest, PaymentInstrument, TransactionHandle};
use crate::processor::{CardProcessor, CryptoChargeProcessor, ProcessorError};
use crate::wallet::{TransferRequest, WalletError, WalletSession};

const DEFAULT_CHARGE_NAME: &str = "Global BUSAN donation";

impl From<WalletError> for DonationError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::UserRejected => DonationError::UserRejected,
            WalletError::InsufficientFunds(detail) => DonationError::InsufficientFunds(detail),
            WalletError::NoProvider(detail) => DonationError::NoProvider(detail),
            WalletError::Provider(message) => DonationError::ProcessorRejected {
                processor: "wallet".to_string(),
                message,
            },
        }
    }
}

/// Map a processor failure during `operation` on `network`.
pub fn processor_error(network: Network, operation: &str, e: ProcessorError) -> DonationError {
    match e {
        ProcessorError::Rejected { processor, message } => DonationError::ProcessorRejected {
            processor: processor.to_string(),
            message,
        },
        ProcessorError::Unavailable { reason, .. } => DonationError::ChainUnavailable {
            network,
            reference: None,
            operation: operation.to_string(),
            reason,
        },
        ProcessorError::NotConfigured(message) => DonationError::Config(message),
    }
}

#[derive(Clone)]
pub struct Submitter {
    converter: Arc<Converter>,
    card: Option<Arc<dyn CardProcessor>>,
    charges: Option<Arc<dyn CryptoChargeProcessor>>,
}

impl Submitter {
    pub fn new(converter: Arc<Converter>) -> Self {
        Self {
            converter,
            card: None,
            charges: None,
        }
    }

    pub fn with_card_processor(mut self, processor: Arc<dyn CardProcessor>) -> Self {
        self.card = Some(processor);
        self
    }

    pub fn with_charge_processor(mut self, processor: Arc<dyn CryptoChargeProcessor>) -> Self {
        self.charges = Some(processor);
        self
    }

    pub async fn submit(
        &self,
        request: &DonationRequest,
        instrument: &PaymentInstrument,
    ) -> Result<TransactionHandle, DonationError> {
        let handle = match (request.network.family(), instrument) {
            (NetworkFamily::Evm | NetworkFamily::Solana, PaymentInstrument::Wallet(session)) => {
                self.submit_transfer(request, session).await?
            }
            (NetworkFamily::Card, PaymentInstrument::Card(confirmer)) => {
                let processor = self
                    .card
                    .as_ref()
                    .ok_or_else(|| DonationError::Config("card payments are not configured".to_string()))?;
                self.submit_card(request, processor.as_ref(), confirmer.as_ref()).await?
            }
            (NetworkFamily::HostedCharge, PaymentInstrument::HostedCheckout) => {
                let processor = self
                    .charges
                    .as_ref()
                    .ok_or_else(|| DonationError::Config("hosted checkout is not configured".to_string()))?;
                self.submit_charge(request, processor.as_ref()).await?
            }
            (_, instrument) => {
                return Err(DonationError::Validation(format!(
                    "{:?} cannot pay on {}",
                    instrument, request.network
                )))
            }
        };

        tracing::info!(
            network = %handle.network,
            reference = %handle.external_reference,
            payer = %request.payer,
            amount = %request.amount,
            currency = %request.currency,
            "Donation submitted"
        );
        Ok(handle)
    }

    async fn submit_transfer(
        &self,
        request: &DonationRequest,
        session: &WalletSession,
    ) -> Result<TransactionHandle, DonationError> {
        let network = request.network;
        if !session.supports(network) {
            return Err(DonationError::NoProvider(format!("connected wallet cannot send on {}", network)));
        }
        if !session.is_connected() {
            session.connect().await?;
        }

        let recipient = request
            .recipient
            .clone()
            .ok_or_else(|| DonationError::Validation("A recipient address is required".to_string()))?;

        let native = network
            .native_currency()
            .ok_or_else(|| DonationError::Config(format!("{} has no native currency", network)))?;
        let conversion = self.converter.convert_checked(request.amount, &request.currency, &native);
        if let Some(warning) = conversion.warning {
            // Never send an unconverted amount.
            return Err(DonationError::Validation(format!(
                "Cannot send {} on {}: {}",
                request.currency, network, warning
            )));
        }

        let transfer = TransferRequest {
            network,
            to: recipient,
            amount: conversion.amount,
            currency: native,
        };
        let reference = session.signer().sign_and_send(&transfer).await?;
        Ok(TransactionHandle::new(reference, network))
    }

    async fn submit_card(
        &self,
        request: &DonationRequest,
        processor: &dyn CardProcessor,
        confirmer: &dyn crate::processor::CardConfirmer,
    ) -> Result<TransactionHandle, DonationError> {
        let amount_minor = to_minor_units(request.amount, &request.currency).ok_or_else(|| {
            DonationError::Validation(format!("{} {} cannot be charged", request.amount, request.currency))
        })?;

        let intent = processor
            .create_payment_intent(amount_minor, &request.currency, &charge_metadata(request))
            .await
            .map_err(|e| processor_error(Network::Card, "create_payment_intent", e))?;

        let confirmation = confirmer
            .confirm(&intent)
            .await
            .map_err(|e| processor_error(Network::Card, "confirm_payment", e))?;

        if !confirmation.is_accepted() {
            return Err(DonationError::ProcessorRejected {
                processor: "stripe".to_string(),
                message: format!("payment {} ended in status {}", confirmation.id, confirmation.status),
            });
        }

        Ok(TransactionHandle::new(confirmation.id, Network::Card))
    }

    async fn submit_charge(
        &self,
        request: &DonationRequest,
        processor: &dyn CryptoChargeProcessor,
    ) -> Result<TransactionHandle, DonationError> {
        let name = request.description.as_deref().unwrap_or(DEFAULT_CHARGE_NAME);
        let charge = processor
            .create_charge(name, request.amount, &request.currency, &charge_metadata(request))
            .await
            .map_err(|e| processor_error(Network::Coinbase, "create_charge", e))?;

        let mut handle = TransactionHandle::new(charge.code, Network::Coinbase);
        handle.checkout_url = Some(charge.hosted_url);
        Ok(handle)
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("card", &self.card.is_some())
            .field("charges", &self.charges.is_some())
            .finish()
    }
}

fn charge_metadata(request: &DonationRequest) -> HashMap<String, String> {
    let mut metadata = request.metadata.clone();
    metadata.insert("payer".to_string(), request.payer.clone());
    if let Some(description) = &request.description {
        metadata.insert("description".to_string(), description.clone());
    }
    metadata
}

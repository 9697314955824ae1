//! Stripe card processor over its REST API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainError, ChainResult, Network, NetworkAdapter, ObservedTransfer, PollStatus};
use crate::config::{StripeConfig, STRIPE_SECRET_KEY_ENV};
use crate::currency::{from_minor_units, Currency};
use crate::processor::types::{
    CardProcessor, CardRefund, PaymentIntent, ProcessorError, ProcessorResult,
};

const PROCESSOR: &str = "stripe";

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig, secret_key: String) -> ProcessorResult<Self> {
        if secret_key.trim().is_empty() {
            return Err(ProcessorError::NotConfigured("Stripe secret key is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProcessorError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Read the secret key from `STRIPE_SECRET_KEY`.
    pub fn from_env(config: &StripeConfig) -> ProcessorResult<Self> {
        let key = std::env::var(STRIPE_SECRET_KEY_ENV).map_err(|_| {
            ProcessorError::NotConfigured(format!("Environment variable {} not set", STRIPE_SECRET_KEY_ENV))
        })?;
        Self::new(config, key)
    }

    async fn send_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> ProcessorResult<T> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(unavailable)?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ProcessorResult<T> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(unavailable)?;
        decode(response).await
    }
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: reqwest::Error) -> ProcessorError {
    ProcessorError::Unavailable {
        processor: PROCESSOR,
        reason: e.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ProcessorResult<T> {
    let status = response.status();
    let text = response.text().await.map_err(unavailable)?;

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProcessorError::Unavailable {
            processor: PROCESSOR,
            reason: format!("HTTP {}", status),
        });
    }

    if !status.is_success() {
        let message = serde_json::from_str::<StripeErrorEnvelope>(&text)
            .ok()
            .map(|env| match (env.error.message, env.error.code) {
                (Some(message), Some(code)) => format!("{} ({})", message, code),
                (Some(message), None) => message,
                (None, Some(code)) => code,
                (None, None) => format!("HTTP {}", status),
            })
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(ProcessorError::Rejected {
            processor: PROCESSOR,
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| ProcessorError::Unavailable {
        processor: PROCESSOR,
        reason: format!("malformed response: {}", e),
    })
}

/// Stripe form fields for a payment intent.
pub fn payment_intent_form(
    amount_minor: i64,
    currency: &Currency,
    metadata: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), amount_minor.to_string()),
        ("currency".to_string(), currency.as_str().to_ascii_lowercase()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
    ];
    let mut keys: Vec<_> = metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), metadata[key].clone()));
    }
    form
}

#[async_trait]
impl CardProcessor for StripeClient {
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &Currency,
        metadata: &HashMap<String, String>,
    ) -> ProcessorResult<PaymentIntent> {
        let form = payment_intent_form(amount_minor, currency, metadata);
        let intent: PaymentIntent = self.send_form("/v1/payment_intents", &form).await?;
        tracing::info!(
            payment_intent = %intent.id,
            amount_minor,
            currency = %currency,
            "Payment intent created"
        );
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &str) -> ProcessorResult<PaymentIntent> {
        self.get(&format!("/v1/payment_intents/{}", id)).await
    }

    async fn refund(&self, payment_intent_id: &str, amount_minor: Option<i64>) -> ProcessorResult<CardRefund> {
        let mut form = vec![("payment_intent".to_string(), payment_intent_id.to_string())];
        if let Some(amount) = amount_minor {
            form.push(("amount".to_string(), amount.to_string()));
        }
        let refund: CardRefund = self.send_form("/v1/refunds", &form).await?;
        tracing::info!(payment_intent = %payment_intent_id, refund = %refund.id, status = %refund.status, "Card refund issued");
        Ok(refund)
    }
}

/// Polls payment intent status for card donations.
pub struct CardStatusAdapter {
    processor: Arc<dyn CardProcessor>,
}

impl CardStatusAdapter {
    pub fn new(processor: Arc<dyn CardProcessor>) -> Self {
        Self { processor }
    }
}

/// Map a payment intent onto the common poll vocabulary.
pub fn intent_poll_status(intent: &PaymentIntent) -> PollStatus {
    match intent.status.as_str() {
        "succeeded" => {
            let currency = Currency::new(&intent.currency);
            let received = intent.amount_received.unwrap_or(intent.amount);
            PollStatus::Succeeded {
                confirmations: 1,
                transfer: ObservedTransfer {
                    amount: Some(from_minor_units(received, &currency)),
                    currency: Some(currency),
                    recipient: None,
                    block_or_slot: None,
                },
            }
        }
        "canceled" => PollStatus::Failed {
            reason: "payment intent was canceled".to_string(),
        },
        "requires_payment_method" => PollStatus::Failed {
            reason: "card payment was declined".to_string(),
        },
        _ => PollStatus::Pending { confirmations: 0 },
    }
}

#[async_trait]
impl NetworkAdapter for CardStatusAdapter {
    fn network(&self) -> Network {
        Network::Card
    }

    fn required_confirmations(&self) -> u64 {
        1
    }

    async fn poll(&self, reference: &str) -> ChainResult<PollStatus> {
        match self.processor.retrieve_payment_intent(reference).await {
            Ok(intent) => Ok(intent_poll_status(&intent)),
            Err(ProcessorError::Rejected { message, .. }) => Ok(PollStatus::Failed { reason: message }),
            Err(e) => Err(ChainError::Unavailable {
                network: Network::Card,
                operation: "retrieve_payment_intent",
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent(status: &str) -> PaymentIntent {
        PaymentIntent {
            id: "pi_123".to_string(),
            client_secret: None,
            status: status.to_string(),
            amount: 2500,
            amount_received: Some(2500),
            currency: "usd".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_form_encoding() {
        let mut metadata = HashMap::new();
        metadata.insert("payer".to_string(), "donor@example.com".to_string());
        let form = payment_intent_form(2500, &Currency::from("USD"), &metadata);
        assert!(form.contains(&("amount".to_string(), "2500".to_string())));
        assert!(form.contains(&("currency".to_string(), "usd".to_string())));
        assert!(form.contains(&("metadata[payer]".to_string(), "donor@example.com".to_string())));
    }

    #[test]
    fn test_intent_status_mapping() {
        match intent_poll_status(&intent("succeeded")) {
            PollStatus::Succeeded { transfer, .. } => {
                assert_eq!(transfer.amount, Some(dec!(25)));
                assert_eq!(transfer.currency, Some(Currency::from("USD")));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(intent_poll_status(&intent("processing")), PollStatus::Pending { .. }));
        assert!(matches!(intent_poll_status(&intent("canceled")), PollStatus::Failed { .. }));
    }

    #[test]
    fn test_empty_key_is_not_configured() {
        let result = StripeClient::new(&StripeConfig::default(), "  ".to_string());
        assert!(matches!(result, Err(ProcessorError::NotConfigured(_))));
    }
}

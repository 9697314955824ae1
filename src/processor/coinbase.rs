//! Coinbase Commerce hosted-checkout charges.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainError, ChainResult, Network, NetworkAdapter, ObservedTransfer, PollStatus};
use crate::config::{CoinbaseConfig, COINBASE_API_KEY_ENV};
use crate::currency::Currency;
use crate::processor::types::{
    Charge, ChargeStatus, CryptoChargeProcessor, ProcessorError, ProcessorResult,
};

const PROCESSOR: &str = "coinbase";
const API_VERSION: &str = "2018-03-22";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChargeBody {
    id: String,
    code: String,
    hosted_url: String,
    #[serde(default)]
    timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pricing: Option<Pricing>,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    status: ChargeStatus,
}

#[derive(Debug, Deserialize)]
struct Pricing {
    local: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    amount: Decimal,
    currency: String,
}

impl From<ChargeBody> for Charge {
    fn from(body: ChargeBody) -> Self {
        let status = body
            .timeline
            .last()
            .map(|entry| entry.status)
            .unwrap_or(ChargeStatus::New);
        let local = body.pricing.and_then(|p| p.local);
        Charge {
            id: body.id,
            code: body.code,
            hosted_url: body.hosted_url,
            status,
            amount: local.as_ref().map(|m| m.amount),
            currency: local.map(|m| Currency::new(&m.currency)),
        }
    }
}

#[derive(Clone)]
pub struct CoinbaseCommerce {
    http: Client,
    api_base: String,
}

impl CoinbaseCommerce {
    pub fn new(config: &CoinbaseConfig, api_key: &str) -> ProcessorResult<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| ProcessorError::NotConfigured("Coinbase API key is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert("X-CC-Api-Key", key);
        headers.insert("X-CC-Version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ProcessorError::NotConfigured(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Read the API key from `COINBASE_COMMERCE_API_KEY`.
    pub fn from_env(config: &CoinbaseConfig) -> ProcessorResult<Self> {
        let key = std::env::var(COINBASE_API_KEY_ENV).map_err(|_| {
            ProcessorError::NotConfigured(format!("Environment variable {} not set", COINBASE_API_KEY_ENV))
        })?;
        Self::new(config, &key)
    }

    async fn decode(response: reqwest::Response) -> ProcessorResult<Charge> {
        let status = response.status();
        let text = response.text().await.map_err(unavailable)?;

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProcessorError::Unavailable {
                processor: PROCESSOR,
                reason: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(ProcessorError::Rejected {
                processor: PROCESSOR,
                message,
            });
        }

        let envelope: Envelope<ChargeBody> =
            serde_json::from_str(&text).map_err(|e| ProcessorError::Unavailable {
                processor: PROCESSOR,
                reason: format!("malformed response: {}", e),
            })?;
        Ok(envelope.data.into())
    }
}

impl std::fmt::Debug for CoinbaseCommerce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseCommerce")
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

#[async_trait]
impl CryptoChargeProcessor for CoinbaseCommerce {
    async fn create_charge(
        &self,
        name: &str,
        amount: Decimal,
        currency: &Currency,
        metadata: &HashMap<String, String>,
    ) -> ProcessorResult<Charge> {
        let body = json!({
            "name": name,
            "description": name,
            "pricing_type": "fixed_price",
            "local_price": {
                "amount": amount.normalize().to_string(),
                "currency": currency.as_str(),
            },
            "metadata": metadata,
        });

        let response = self
            .http
            .post(format!("{}/charges", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let charge = Self::decode(response).await?;
        tracing::info!(code = %charge.code, amount = %amount, currency = %currency, "Coinbase charge created");
        Ok(charge)
    }

    async fn get_charge(&self, code: &str) -> ProcessorResult<Charge> {
        let response = self
            .http
            .get(format!("{}/charges/{}", self.api_base, code))
            .send()
            .await
            .map_err(unavailable)?;
        Self::decode(response).await
    }
}

/// Polls hosted charge status by charge code.
pub struct ChargeStatusAdapter {
    processor: Arc<dyn CryptoChargeProcessor>,
}

impl ChargeStatusAdapter {
    pub fn new(processor: Arc<dyn CryptoChargeProcessor>) -> Self {
        Self { processor }
    }
}

pub fn charge_poll_status(charge: &Charge) -> PollStatus {
    if charge.status.is_settled() {
        PollStatus::Succeeded {
            confirmations: 1,
            transfer: ObservedTransfer {
                amount: charge.amount,
                currency: charge.currency.clone(),
                recipient: None,
                block_or_slot: None,
            },
        }
    } else if charge.status.is_dead() {
        PollStatus::Failed {
            reason: format!("charge {:?}", charge.status).to_lowercase(),
        }
    } else {
        PollStatus::Pending { confirmations: 0 }
    }
}

#[async_trait]
impl NetworkAdapter for ChargeStatusAdapter {
    fn network(&self) -> Network {
        Network::Coinbase
    }

    fn required_confirmations(&self) -> u64 {
        1
    }

    async fn poll(&self, reference: &str) -> ChainResult<PollStatus> {
        match self.processor.get_charge(reference).await {
            Ok(charge) => Ok(charge_poll_status(&charge)),
            Err(ProcessorError::Rejected { message, .. }) => Ok(PollStatus::Failed { reason: message }),
            Err(e) => Err(ChainError::Unavailable {
                network: Network::Coinbase,
                operation: "get_charge",
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn body(statuses: &[&str]) -> ChargeBody {
        let timeline: Vec<_> = statuses.iter().map(|s| json!({ "status": s, "time": "2024-01-01T00:00:00Z" })).collect();
        serde_json::from_value(json!({
            "id": "f7f5b5b4",
            "code": "ABCD1234",
            "hosted_url": "https://commerce.coinbase.com/charges/ABCD1234",
            "timeline": timeline,
            "pricing": { "local": { "amount": "25.00", "currency": "USD" } }
        }))
        .unwrap()
    }

    #[test]
    fn test_status_comes_from_last_timeline_entry() {
        let charge: Charge = body(&["NEW", "PENDING", "COMPLETED"]).into();
        assert_eq!(charge.status, ChargeStatus::Completed);
        assert_eq!(charge.amount, Some(dec!(25.00)));

        let fresh: Charge = body(&[]).into();
        assert_eq!(fresh.status, ChargeStatus::New);
    }

    #[test]
    fn test_charge_poll_mapping() {
        let settled: Charge = body(&["NEW", "CONFIRMED"]).into();
        assert!(matches!(charge_poll_status(&settled), PollStatus::Succeeded { .. }));

        let expired: Charge = body(&["NEW", "EXPIRED"]).into();
        match charge_poll_status(&expired) {
            PollStatus::Failed { reason } => assert_eq!(reason, "charge expired"),
            other => panic!("unexpected {:?}", other),
        }

        let pending: Charge = body(&["NEW", "PENDING"]).into();
        assert!(matches!(charge_poll_status(&pending), PollStatus::Pending { .. }));
    }

    #[test]
    fn test_unlisted_timeline_status_keeps_polling() {
        for status in ["REFUND PENDING", "REFUNDED", "SOMETHING_NEW"] {
            let charge: Charge = body(&["NEW", status]).into();
            assert_eq!(charge.status, ChargeStatus::Unknown);
            assert!(matches!(charge_poll_status(&charge), PollStatus::Pending { .. }));
        }
    }
}

//! Solana JSON-RPC client for transaction lookups.
//!
//! Uses `getTransaction` with `jsonParsed` encoding so native SOL transfers
//! can be read from the parsed system-program instruction. There is no
//! retry here: transport failures surface as `ChainError::Unavailable` and
//! the confirmation waiter asks again on its next tick.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::chain::types::{ChainError, ChainResult, Network};
use crate::config::SolanaConfig;

pub const LAMPORTS_PER_SOL: i64 = 1_000_000_000;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// A confirmed transaction as returned by `getTransaction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaTransaction {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMeta {
    /// Non-null when the transaction failed.
    pub err: Option<Value>,
    pub fee: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEnvelope {
    pub message: TransactionMessage,
    #[serde(default)]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMessage {
    #[serde(default)]
    pub instructions: Vec<Value>,
}

/// Execution result of a transaction (the Solana analogue of a receipt).
#[derive(Debug, Clone, PartialEq)]
pub struct SolanaReceipt {
    pub slot: u64,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// A native SOL transfer extracted from a parsed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SolTransfer {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

impl SolanaTransaction {
    pub fn receipt(&self) -> SolanaReceipt {
        let error = self
            .meta
            .as_ref()
            .and_then(|m| m.err.as_ref())
            .filter(|err| !err.is_null())
            .map(|err| err.to_string());
        SolanaReceipt {
            slot: self.slot,
            succeeded: error.is_none(),
            error,
        }
    }

    /// First system-program `transfer` instruction, if any.
    pub fn native_transfer(&self) -> Option<SolTransfer> {
        self.transaction.message.instructions.iter().find_map(|ix| {
            if ix.get("program").and_then(Value::as_str) != Some("system") {
                return None;
            }
            let parsed = ix.get("parsed")?;
            let kind = parsed.get("type").and_then(Value::as_str)?;
            if kind != "transfer" && kind != "transferWithSeed" {
                return None;
            }
            let info = parsed.get("info")?;
            Some(SolTransfer {
                source: info.get("source")?.as_str()?.to_string(),
                destination: info.get("destination")?.as_str()?.to_string(),
                lamports: info.get("lamports")?.as_u64()?,
            })
        })
    }
}

pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SolanaClient {
    http: Client,
    rpc_url: String,
    commitment: String,
    required_confirmations: u64,
}

impl SolanaClient {
    pub fn new(config: &SolanaConfig) -> ChainResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .map_err(|e| ChainError::Config(format!("Failed to build Solana HTTP client: {}", e)))?;

        url::Url::parse(&config.rpc_url).map_err(|e| {
            ChainError::Config(format!("Invalid Solana RPC URL '{}': {}", config.rpc_url, e))
        })?;

        tracing::info!(rpc_url = %config.rpc_url, commitment = %config.commitment, "Solana client initialized");

        Ok(Self {
            http,
            rpc_url: config.rpc_url.clone(),
            commitment: config.commitment.clone(),
            required_confirmations: config.required_confirmations,
        })
    }

    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> ChainResult<Option<T>> {
        let unavailable = |reason: String| ChainError::Unavailable {
            network: Network::Solana,
            operation,
            reason,
        };

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(ChainError::RpcRejected {
                network: Network::Solana,
                operation,
                code: err.code,
                message: err.message,
            });
        }

        Ok(body.result)
    }

    /// Transaction by signature; `None` if the cluster has not seen it.
    pub async fn get_transaction(&self, signature: &str) -> ChainResult<Option<SolanaTransaction>> {
        if signature.trim().is_empty() {
            return Err(ChainError::InvalidReference(signature.to_string()));
        }
        let params = json!([
            signature,
            {
                "encoding": "jsonParsed",
                "commitment": self.commitment,
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let tx = self.call("get_transaction", "getTransaction", params).await?;
        if tx.is_none() {
            tracing::debug!(signature, "Solana transaction not found");
        }
        Ok(tx)
    }

    /// Execution result for a signature; `None` if not found.
    pub async fn get_receipt(&self, signature: &str) -> ChainResult<Option<SolanaReceipt>> {
        Ok(self.get_transaction(signature).await?.map(|tx| tx.receipt()))
    }

    pub async fn get_slot(&self) -> ChainResult<u64> {
        let params = json!([{ "commitment": self.commitment }]);
        self.call("get_slot", "getSlot", params)
            .await?
            .ok_or_else(|| ChainError::Unavailable {
                network: Network::Solana,
                operation: "get_slot",
                reason: "empty result".to_string(),
            })
    }
}

//! Network identifiers, poll results and chain error definitions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::currency::{Currency, PaymentMethod};

/// Where a donation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Ethereum,
    Polygon,
    Bsc,
    Sepolia,
    Solana,
    /// Card payment through the card processor.
    Card,
    /// Hosted crypto checkout (Coinbase Commerce charge).
    Coinbase,
}

/// Coarse grouping used for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFamily {
    Evm,
    Solana,
    Card,
    HostedCharge,
}

impl Network {
    pub const ALL: [Network; 7] = [
        Network::Ethereum,
        Network::Polygon,
        Network::Bsc,
        Network::Sepolia,
        Network::Solana,
        Network::Card,
        Network::Coinbase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Bsc => "bsc",
            Network::Sepolia => "sepolia",
            Network::Solana => "solana",
            Network::Card => "card",
            Network::Coinbase => "coinbase",
        }
    }

    pub fn family(&self) -> NetworkFamily {
        match self {
            Network::Ethereum | Network::Polygon | Network::Bsc | Network::Sepolia => {
                NetworkFamily::Evm
            }
            Network::Solana => NetworkFamily::Solana,
            Network::Card => NetworkFamily::Card,
            Network::Coinbase => NetworkFamily::HostedCharge,
        }
    }

    pub fn is_evm(&self) -> bool {
        self.family() == NetworkFamily::Evm
    }

    /// Native asset moved by a direct transfer, if the network has one.
    pub fn native_currency(&self) -> Option<Currency> {
        match self {
            Network::Ethereum | Network::Sepolia => Some(Currency::from("ETH")),
            Network::Polygon => Some(Currency::from("MATIC")),
            Network::Bsc => Some(Currency::from("BNB")),
            Network::Solana => Some(Currency::from("SOL")),
            Network::Card | Network::Coinbase => None,
        }
    }

    /// Which minimum-amount table applies to donations on this network.
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            Network::Card => PaymentMethod::Card,
            _ => PaymentMethod::CryptoProcessor,
        }
    }

    /// Check that `recipient` looks like an address on this network.
    pub fn validate_recipient(&self, recipient: &str) -> bool {
        match self.family() {
            NetworkFamily::Evm => recipient.parse::<alloy::primitives::Address>().is_ok(),
            NetworkFamily::Solana => is_base58_pubkey(recipient),
            NetworkFamily::Card | NetworkFamily::HostedCharge => !recipient.trim().is_empty(),
        }
    }
}

fn is_base58_pubkey(value: &str) -> bool {
    const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (32..=44).contains(&value.len()) && value.chars().all(|c| ALPHABET.contains(c))
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChainError::UnknownNetwork(s.to_string()))
    }
}

/// Errors raised while querying a chain or a payment status endpoint.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport failure, timeout or server error. Safe to ask again later.
    #[error("{network} unavailable during {operation}: {reason}")]
    Unavailable {
        network: Network,
        operation: &'static str,
        reason: String,
    },

    /// The node answered with a JSON-RPC error for this request.
    #[error("{network} RPC rejected {operation} ({code}): {message}")]
    RpcRejected {
        network: Network,
        operation: &'static str,
        code: i64,
        message: String,
    },

    /// The reference is not a well-formed hash/signature for the network.
    #[error("Invalid transaction reference '{0}'")]
    InvalidReference(String),

    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),

    /// Chain ID reported by the node differs from configuration.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Chain client configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// Whether the caller should simply poll again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable { .. })
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Amount and recipient observed on-chain (or at the processor).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservedTransfer {
    /// Amount in `currency` units (ETH, SOL, USD...), not base units.
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub recipient: Option<String>,
    pub block_or_slot: Option<u64>,
}

/// One observation of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// The network does not know the reference (yet).
    NotFound,
    /// Seen but not yet in a block / not yet settled.
    Pending { confirmations: u64 },
    /// Executed successfully with this many confirmations so far.
    Succeeded {
        confirmations: u64,
        transfer: ObservedTransfer,
    },
    /// Executed and failed (reverted, `meta.err`, charge expired...).
    Failed { reason: String },
}

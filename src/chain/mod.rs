//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Config ([evm.*], [solana])
//!     → evm.rs / solana.rs (read-only RPC clients with timeouts)
//!     → adapter.rs (one NetworkAdapter per network: poll(reference) → PollStatus)
//!     → payments::waiter (fixed-interval polling until a terminal state)
//! ```
//!
//! # Failure semantics
//! - "Not found" is `Ok(None)` / `PollStatus::NotFound`, never an error
//! - A failed transaction is `PollStatus::Failed`
//! - Transport problems are `ChainError::Unavailable`: ask again later

pub mod adapter;
pub mod evm;
pub mod explorer;
pub mod health;
pub mod solana;
pub mod types;

pub use adapter::{AdapterRegistry, EvmAdapter, NetworkAdapter, SolanaAdapter};
pub use evm::EvmClient;
pub use explorer::explorer_url;
pub use health::RpcHealthMonitor;
pub use solana::SolanaClient;
pub use types::{ChainError, ChainResult, Network, NetworkFamily, ObservedTransfer, PollStatus};

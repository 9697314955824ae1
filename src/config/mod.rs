//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + secrets from environment
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → AppConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → apply_reload swaps rate and minimum tables
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an empty file is a valid config
//! - Secrets never live in the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AppConfig, CoinbaseConfig, ConfirmationConfig, EvmNetworkConfig, LedgerBackend,
    LedgerConfig, MinimumsConfig, ObservabilityConfig, RefundConfig, ServerConfig, SolanaConfig,
    StripeConfig, ADMIN_API_KEY_ENV, COINBASE_API_KEY_ENV, STRIPE_SECRET_KEY_ENV, SUPABASE_KEY_ENV,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::{apply_reload, ConfigWatcher};

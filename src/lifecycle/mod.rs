//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → rate/minimum tables → adapters → processors → ledger store
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop admin listener → cancel confirmation waits → drain tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → config reload (rates and minimums)
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{handle_signals, SignalEvent};
pub use startup::{build_runtime, build_store, Runtime, StartupError};

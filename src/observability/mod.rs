//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (network, reference, status)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! Secrets (API keys, private keys, client secrets) never appear in fields.

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::init_metrics;

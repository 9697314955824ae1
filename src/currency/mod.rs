//! Currency handling: codes, conversion and amount validation.
//!
//! # Data Flow
//! ```text
//! DonationRequest (amount, currency, method)
//!     → validator.rs (positivity, per-method minimums)
//!     → converter.rs (request currency → network native currency)
//! ```
//!
//! Both tables are static in-memory data, overridable from config and
//! replaced atomically on config reload. Nothing here performs I/O.

pub mod converter;
pub mod types;
pub mod validator;

pub use converter::{Conversion, ConversionWarning, Converter, RateTable};
pub use types::{format_amount, from_minor_units, to_minor_units, Currency};
pub use validator::{MinimumTable, PaymentMethod, PaymentValidator, ValidationResult};

//! Types library for the market-data collector
//!
//! This library provides the shared vocabulary used by the collector
//! service: identifiers, order sides, decimal helpers and exchange-time
//! conversion.
//!
//! # Modules
//! - `ids`: Identifiers (InstrumentId, OrderId)
//! - `numeric`: Decimal helpers (whole-unit rounding, checked ratios)
//! - `order`: Order side
//! - `time`: Exchange-local timestamps
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod order;
pub mod time;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

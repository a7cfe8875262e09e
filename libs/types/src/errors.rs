//! Error types shared by the collector crates
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Decimal arithmetic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("Division by zero while computing {context}")]
    DivisionByZero { context: &'static str },

    #[error("Decimal overflow while computing {context}")]
    Overflow { context: &'static str },
}

/// Exchange timestamp errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Malformed timestamp: {raw}")]
    Malformed { raw: String },

    #[error("Timestamp out of range: {raw}")]
    OutOfRange { raw: String },
}

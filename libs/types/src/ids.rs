//! Identifier types for instruments and orders
//!
//! Both identifiers are opaque exchange-assigned strings. Instrument codes
//! look like `BTC_JPY` or `FX_BTC_JPY`; order identifiers are child-order
//! acceptance ids such as `JRF20150707-050237-639234`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange product code identifying one tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the product code string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Order acceptance identifier attached to each side of an execution.
///
/// The taker and the maker of an execution each carry one of these; an
/// empty string is a legal value on the wire and simply never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for OrderId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

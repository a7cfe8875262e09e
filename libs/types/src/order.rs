//! Order side

use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
///
/// On an execution this is the taker's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

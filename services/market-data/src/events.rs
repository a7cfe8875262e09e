//! Event definitions for the collector
//!
//! Inbound: the typed events a feed delivers once wire decoding is done.
//! Prices and sizes arrive as `Decimal`; timestamps arrive as the raw UTC
//! strings the exchange sends and are converted by the engines.
//!
//! Outbound: the notification raised to the observer after each event.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, OrderId};
use types::order::Side;

use crate::dataset::Dataset;
use crate::order_book::PriceLevel;

/// Depth snapshot or diff for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMessage {
    pub instrument: InstrumentId,
    pub mid_price: Decimal,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

/// Best-quote summary (ticker) for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: InstrumentId,
    /// UTC, fractional seconds, e.g. `2019-04-11T05:14:12.3739915Z`
    pub timestamp: String,
    pub best_bid_price: Decimal,
    pub best_bid_size: Decimal,
    pub best_ask_price: Decimal,
    pub best_ask_size: Decimal,
    pub total_bid_depth: Decimal,
    pub total_ask_depth: Decimal,
    pub last_traded_price: Decimal,
    pub volume_24h: Decimal,
}

/// One matched trade as reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// UTC, fractional seconds
    pub timestamp: String,
    /// Taker side
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
}

/// Executions for one instrument, ordered oldest → newest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    pub instrument: InstrumentId,
    pub executions: Vec<ExecutionRecord>,
}

/// Every event the collector consumes from a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum FeedEvent {
    DepthSnapshot(DepthMessage),
    DepthDiff(DepthMessage),
    Quote(Quote),
    Executions(ExecutionBatch),
}

impl FeedEvent {
    pub fn instrument(&self) -> &InstrumentId {
        match self {
            FeedEvent::DepthSnapshot(m) | FeedEvent::DepthDiff(m) => &m.instrument,
            FeedEvent::Quote(q) => &q.instrument,
            FeedEvent::Executions(b) => &b.instrument,
        }
    }

    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            FeedEvent::DepthSnapshot(_) => "DepthSnapshot",
            FeedEvent::DepthDiff(_) => "DepthDiff",
            FeedEvent::Quote(_) => "Quote",
            FeedEvent::Executions(_) => "Executions",
        }
    }

    /// The notification raised once this event has been applied.
    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            FeedEvent::DepthSnapshot(_) | FeedEvent::DepthDiff(_) => NotificationKind::DepthChanged,
            FeedEvent::Quote(_) => NotificationKind::TickChanged,
            FeedEvent::Executions(_) => NotificationKind::TradeChanged,
        }
    }
}

/// Kind of notification raised to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    DepthChanged,
    TickChanged,
    TradeChanged,
    /// Upstream error; carries no dataset.
    Error,
    /// Operator-requested stop; carries no dataset.
    Interrupted,
}

/// Notification handed to the observer, with read access to the dataset
/// for the change kinds.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    pub kind: NotificationKind,
    pub dataset: Option<&'a Dataset>,
}

impl<'a> Notification<'a> {
    pub fn changed(kind: NotificationKind, dataset: &'a Dataset) -> Self {
        Self {
            kind,
            dataset: Some(dataset),
        }
    }

    pub fn error() -> Self {
        Self {
            kind: NotificationKind::Error,
            dataset: None,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            kind: NotificationKind::Interrupted,
            dataset: None,
        }
    }
}

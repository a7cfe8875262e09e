//! Market Data Collector
//!
//! Consumes a live exchange feed for a spot/leveraged instrument pair and
//! maintains queryable aggregates:
//! - Depth books with bounded length and mid-price filtering
//! - Rolling tick series with on-demand moving candles
//! - A rolling trade ledger with order-fill reconciliation
//! - The settlement premium tier between leveraged and spot prices
//!
//! All engines read time through one drift-corrected [`clock::TimeSource`]
//! and use `Decimal` arithmetic throughout.
//!
//! # Architecture
//!
//! ```text
//!   FeedSource
//!        │ mpsc
//!   ┌────▼─────┐   resync once a minute   ┌────────────┐
//!   │Collector │─────────────────────────▶│ TimeSource │
//!   └────┬─────┘                          └─────┬──────┘
//!        │ apply                                │ now()
//!   ┌────▼─────────────────────────────────────▼──┐
//!   │                  Dataset                    │
//!   │  DepthBook │ TickSeries │ TradeLedger │ SFD │
//!   └────┬────────────────────────────────────────┘
//!        │ Notification
//!   ┌────▼─────┐
//!   │ Observer │
//!   └──────────┘
//! ```

pub mod candles;
pub mod clock;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod events;
pub mod feed;
pub mod metrics;
pub mod order_book;
pub mod settlement;
pub mod ticks;
pub mod trades;

pub use clock::{ClockError, TimeSource};
pub use collector::{Collector, CollectorError, Observer, StopHandle};
pub use config::{CollectorConfig, ConfigError};
pub use dataset::{Dataset, DatasetError, InstrumentRole};
pub use events::{FeedEvent, Notification, NotificationKind};
pub use feed::{FeedError, FeedMessage, FeedSource, JsonLinesFeed};
pub use ticks::TickError;
pub use trades::TradeError;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";

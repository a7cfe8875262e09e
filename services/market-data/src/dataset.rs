//! Dataset router
//!
//! Owns one depth book and tick series per registered instrument plus the
//! shared trade ledger and settlement engine, and routes each feed event to
//! the engine keyed by its instrument. Events for unknown instruments are
//! ignored.
//!
//! The dataset is not synchronized internally; the collector serializes
//! every mutation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use types::ids::InstrumentId;
use types::time::ExchangeTime;

use crate::clock::TimeSource;
use crate::events::{DepthMessage, FeedEvent, Quote};
use crate::order_book::{DepthBook, DepthConfig};
use crate::settlement::SettlementSpread;
use crate::ticks::{TickError, TickSeries};
use crate::trades::{TradeError, TradeLedger};

/// What an instrument is to the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentRole {
    /// Spot reference price
    Spot,
    /// Leveraged (FX) pair measured against spot
    Leveraged,
}

/// Errors raised while applying an event. The event is dropped; the
/// engines keep their previous state apart from the availability flag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("tick update for {instrument} failed: {source}")]
    Tick {
        instrument: InstrumentId,
        #[source]
        source: TickError,
    },

    #[error("execution batch for {instrument} failed: {source}")]
    Trade {
        instrument: InstrumentId,
        #[source]
        source: TradeError,
    },
}

/// Outcome of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Applied,
    /// Instrument not registered
    Ignored,
}

/// Per-instrument engines.
#[derive(Debug)]
pub struct InstrumentData {
    pub role: InstrumentRole,
    pub depth: DepthBook,
    pub ticks: TickSeries,
}

#[derive(Debug)]
pub struct Dataset {
    time: Arc<TimeSource>,
    depth_config: DepthConfig,
    keep_time: Duration,
    instruments: BTreeMap<InstrumentId, InstrumentData>,
    trades: TradeLedger,
    settlement: SettlementSpread,
}

impl Dataset {
    pub fn new(time: Arc<TimeSource>, depth_config: DepthConfig, keep_time: Duration) -> Self {
        Self {
            trades: TradeLedger::new(time.clone(), keep_time),
            time,
            depth_config,
            keep_time,
            instruments: BTreeMap::new(),
            settlement: SettlementSpread::new(),
        }
    }

    /// Register an instrument with fresh engines. Re-registering replaces
    /// the previous engines.
    pub fn register(&mut self, instrument: InstrumentId, role: InstrumentRole) {
        let data = InstrumentData {
            role,
            depth: DepthBook::new(self.depth_config),
            ticks: TickSeries::new(self.time.clone(), self.keep_time),
        };
        self.instruments.insert(instrument, data);
    }

    /// Route one event to its engine.
    pub fn apply(&mut self, event: &FeedEvent) -> Result<Routing, DatasetError> {
        let instrument = event.instrument();
        let Some(data) = self.instruments.get_mut(instrument) else {
            debug!(%instrument, event_type = event.event_type_label(), "Ignoring unregistered instrument");
            return Ok(Routing::Ignored);
        };

        match event {
            FeedEvent::DepthSnapshot(DepthMessage { mid_price, asks, bids, .. }) => {
                data.depth.init(*mid_price, asks, bids);
            }
            FeedEvent::DepthDiff(DepthMessage { mid_price, asks, bids, .. }) => {
                data.depth.update(*mid_price, asks, bids);
            }
            FeedEvent::Quote(quote) => {
                let role = data.role;
                data.ticks.update(quote).map_err(|source| DatasetError::Tick {
                    instrument: instrument.clone(),
                    source,
                })?;
                self.feed_settlement(role, quote);
            }
            FeedEvent::Executions(batch) => {
                self.trades.update(&batch.executions).map_err(|source| DatasetError::Trade {
                    instrument: instrument.clone(),
                    source,
                })?;
            }
        }
        Ok(Routing::Applied)
    }

    fn feed_settlement(&mut self, role: InstrumentRole, quote: &Quote) {
        match role {
            InstrumentRole::Spot => self.settlement.update_spot(quote.last_traded_price),
            InstrumentRole::Leveraged => self.settlement.update_fx(quote.last_traded_price),
        }
    }

    /// Drift-corrected exchange time.
    pub fn get_now(&self) -> ExchangeTime {
        self.time.now()
    }

    pub fn time(&self) -> &Arc<TimeSource> {
        &self.time
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<&InstrumentData> {
        self.instruments.get(id)
    }

    pub fn depth(&self, id: &InstrumentId) -> Option<&DepthBook> {
        self.instruments.get(id).map(|d| &d.depth)
    }

    pub fn ticks(&self, id: &InstrumentId) -> Option<&TickSeries> {
        self.instruments.get(id).map(|d| &d.ticks)
    }

    /// First instrument registered with `role`, in id order.
    pub fn by_role(&self, role: InstrumentRole) -> Option<(&InstrumentId, &InstrumentData)> {
        self.instruments.iter().find(|(_, d)| d.role == role)
    }

    pub fn instruments(&self) -> impl Iterator<Item = (&InstrumentId, &InstrumentData)> {
        self.instruments.iter()
    }

    pub fn trades(&self) -> &TradeLedger {
        &self.trades
    }

    pub fn settlement(&self) -> &SettlementSpread {
        &self.settlement
    }

    pub fn keep_time(&self) -> Duration {
        self.keep_time
    }

    /// Change the keep window of every tick series and the trade ledger.
    pub fn set_keep_time(&mut self, keep_time: Duration) {
        self.keep_time = keep_time;
        self.trades.set_keep_time(keep_time);
        for data in self.instruments.values_mut() {
            data.ticks.set_keep_time(keep_time);
        }
    }
}

//! Rolling tick series
//!
//! Keeps the latest best-quote snapshot for an instrument plus an age-bounded
//! history of last-traded prices. Every sample retained after an update is
//! strictly newer than `now() - keep_time`, where `now()` comes from the
//! shared [`TimeSource`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::{NumericError, TimestampError};
use types::numeric::{relative_difference, to_percent};
use types::time::{parse_exchange_timestamp, ExchangeTime};

use crate::candles::Candle;
use crate::clock::TimeSource;
use crate::events::Quote;

/// Errors that leave a tick update unapplied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    #[error("bad quote timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("bad quote values: {0}")]
    Numeric(#[from] NumericError),
}

/// One last-traded-price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSample {
    pub timestamp: ExchangeTime,
    pub price: Decimal,
}

/// Fields derived from the most recent quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub timestamp: ExchangeTime,
    pub best_bid_price: Decimal,
    pub best_ask_price: Decimal,
    pub best_bid_size: Decimal,
    pub best_ask_size: Decimal,
    pub total_bid_depth: Decimal,
    pub total_ask_depth: Decimal,
    pub last_traded_price: Decimal,
    pub volume_24h: Decimal,
    /// best ask − best bid
    pub spread: Decimal,
    /// best ask / best bid − 1
    pub spread_rate: Decimal,
}

impl QuoteSnapshot {
    fn from_quote(quote: &Quote) -> Result<Self, TickError> {
        let timestamp = parse_exchange_timestamp(&quote.timestamp)?;
        let spread_rate =
            relative_difference(quote.best_ask_price, quote.best_bid_price, "quote spread rate")?;

        Ok(Self {
            timestamp,
            best_bid_price: quote.best_bid_price,
            best_ask_price: quote.best_ask_price,
            best_bid_size: quote.best_bid_size,
            best_ask_size: quote.best_ask_size,
            total_bid_depth: quote.total_bid_depth,
            total_ask_depth: quote.total_ask_depth,
            last_traded_price: quote.last_traded_price,
            volume_24h: quote.volume_24h,
            spread: quote.best_ask_price - quote.best_bid_price,
            spread_rate,
        })
    }

    /// `None` if the percentage overflows.
    pub fn spread_percent(&self) -> Option<Decimal> {
        to_percent(self.spread_rate).ok()
    }
}

/// Rolling window of ticks for one instrument.
#[derive(Debug)]
pub struct TickSeries {
    time: Arc<TimeSource>,
    keep_time: Duration,
    latest: Option<QuoteSnapshot>,
    samples: VecDeque<TickSample>,
    price_max: Option<Decimal>,
    price_min: Option<Decimal>,
    available: bool,
}

impl TickSeries {
    pub fn new(time: Arc<TimeSource>, keep_time: Duration) -> Self {
        Self {
            time,
            keep_time,
            latest: None,
            samples: VecDeque::new(),
            price_max: None,
            price_min: None,
            available: false,
        }
    }

    /// Apply a quote.
    ///
    /// On error the series is marked unavailable and nothing else changes.
    pub fn update(&mut self, quote: &Quote) -> Result<(), TickError> {
        self.available = false;

        let snapshot = QuoteSnapshot::from_quote(quote)?;
        self.samples.push_back(TickSample {
            timestamp: snapshot.timestamp,
            price: snapshot.last_traded_price,
        });
        self.latest = Some(snapshot);
        self.evict_expired();

        self.available = true;
        Ok(())
    }

    fn evict_expired(&mut self) {
        let cutoff = self.time.cutoff(self.keep_time);
        self.samples.retain(|s| s.timestamp > cutoff);

        self.price_max = self.samples.iter().map(|s| s.price).max();
        self.price_min = self.samples.iter().map(|s| s.price).min();
    }

    /// Candle over the samples newer than `now() - duration`.
    ///
    /// `None` when the window would cover the whole retained history (the
    /// result would look complete without being so) or when it is empty.
    pub fn candle(&self, duration: Duration) -> Option<Candle> {
        let cutoff = self.time.cutoff(duration);
        let window: Vec<TickSample> = self
            .samples
            .iter()
            .filter(|s| s.timestamp > cutoff)
            .copied()
            .collect();

        if window.len() >= self.samples.len() {
            return None;
        }
        Candle::from_samples(&window)
    }

    /// True once a quote has been fully applied, false after a failed one.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn latest(&self) -> Option<&QuoteSnapshot> {
        self.latest.as_ref()
    }

    pub fn samples(&self) -> &VecDeque<TickSample> {
        &self.samples
    }

    /// Highest retained last-traded price.
    pub fn price_max(&self) -> Option<Decimal> {
        self.price_max
    }

    /// Lowest retained last-traded price.
    pub fn price_min(&self) -> Option<Decimal> {
        self.price_min
    }

    pub fn keep_time(&self) -> Duration {
        self.keep_time
    }

    /// Takes effect at the next update.
    pub fn set_keep_time(&mut self, keep_time: Duration) {
        self.keep_time = keep_time;
    }
}

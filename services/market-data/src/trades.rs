//! Rolling trade ledger
//!
//! Buffers individual executions split by taker side, evicts them once they
//! fall out of the keep window, and reconciles order fills: for an order id
//! it finds every execution the order took part in (as taker or as maker)
//! and reports one volume-weighted fill price.
//!
//! Trade data is shared across instruments; the dataset owns one ledger.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::{NumericError, TimestampError};
use types::ids::OrderId;
use types::numeric::{checked_product, checked_ratio, checked_sum, floor_units};
use types::order::Side;
use types::time::{
    parse_exchange_timestamp, parse_exchange_timestamp_with_precision, ExchangeTime,
    EXECUTION_PRECISION_DIGITS,
};

use crate::clock::TimeSource;
use crate::events::ExecutionRecord;

/// Errors that reject an execution batch. A rejected batch is not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeError {
    #[error("bad execution timestamp at index {index}: {source}")]
    Timestamp {
        index: usize,
        #[source]
        source: TimestampError,
    },
}

/// A single execution normalized to exchange time, truncated to centiseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub timestamp: ExchangeTime,
    /// Taker side
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
}

impl Execution {
    fn from_record(record: &ExecutionRecord) -> Result<Self, TimestampError> {
        Ok(Self {
            timestamp: parse_exchange_timestamp_with_precision(
                &record.timestamp,
                EXECUTION_PRECISION_DIGITS,
            )?,
            side: record.side,
            price: record.price,
            amount: record.size,
            buy_order_id: record.buy_order_id.clone(),
            sell_order_id: record.sell_order_id.clone(),
        })
    }

    /// Price × amount.
    pub fn notional(&self) -> Result<Decimal, NumericError> {
        checked_product(self.price, self.amount, "execution notional")
    }
}

/// Effective fill of one order across all of its matched executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSummary {
    /// floor(Σ price·amount / Σ amount)
    pub price: Decimal,
    /// Σ amount
    pub amount: Decimal,
    pub fill_count: usize,
}

impl FillSummary {
    /// `None` when nothing matched or the totals overflow.
    fn from_fills<'a>(mut fills: impl Iterator<Item = &'a Execution>) -> Option<Self> {
        let (notional, amount, fill_count) = fills
            .try_fold(
                (Decimal::ZERO, Decimal::ZERO, 0usize),
                |(notional, amount, count), e| -> Result<_, NumericError> {
                    let notional = checked_sum(notional, e.notional()?, "fill notional")?;
                    let amount = checked_sum(amount, e.amount, "fill amount")?;
                    Ok((notional, amount, count + 1))
                },
            )
            .ok()?;

        let average = checked_ratio(notional, amount, "fill average price").ok()?;
        Some(Self {
            price: floor_units(average),
            amount,
            fill_count,
        })
    }
}

/// Last execution of the most recent batch, kept at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrade {
    pub price: Decimal,
    pub timestamp: ExchangeTime,
}

/// Rolling window of executions, split by taker side.
#[derive(Debug)]
pub struct TradeLedger {
    time: Arc<TimeSource>,
    keep_time: Duration,
    buys: VecDeque<Execution>,
    sells: VecDeque<Execution>,
    /// Executions of the most recent batch in input order
    event_values: Vec<Execution>,
    event_amount: Decimal,
    last_trade: Option<LastTrade>,
    available: bool,
}

impl TradeLedger {
    pub fn new(time: Arc<TimeSource>, keep_time: Duration) -> Self {
        Self {
            time,
            keep_time,
            buys: VecDeque::new(),
            sells: VecDeque::new(),
            event_values: Vec::new(),
            event_amount: Decimal::ZERO,
            last_trade: None,
            available: false,
        }
    }

    /// Apply one batch of executions, ordered oldest to newest.
    ///
    /// The whole batch is parsed first; on error nothing is applied and the
    /// ledger is marked unavailable.
    pub fn update(&mut self, records: &[ExecutionRecord]) -> Result<(), TradeError> {
        self.available = false;

        let batch = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                Execution::from_record(record)
                    .map_err(|source| TradeError::Timestamp { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let last_trade = records
            .last()
            .map(|record| {
                parse_exchange_timestamp(&record.timestamp)
                    .map(|timestamp| LastTrade { price: record.price, timestamp })
                    .map_err(|source| TradeError::Timestamp { index: records.len() - 1, source })
            })
            .transpose()?;

        self.event_amount = batch.iter().map(|e| e.amount).sum();
        for execution in &batch {
            match execution.side {
                Side::BUY => self.buys.push_back(execution.clone()),
                Side::SELL => self.sells.push_back(execution.clone()),
            }
        }

        let cutoff = self.time.cutoff(self.keep_time);
        self.buys.retain(|e| e.timestamp > cutoff);
        self.sells.retain(|e| e.timestamp > cutoff);

        if last_trade.is_some() {
            self.last_trade = last_trade;
        }
        self.event_values = batch;

        self.available = self.last_trade.is_some();
        Ok(())
    }

    /// Total (buy, sell) amount executed at or after `now() - window`.
    ///
    /// `None` uses the keep time.
    pub fn amount(&self, window: Option<Duration>) -> (Decimal, Decimal) {
        let cutoff = self.time.cutoff(window.unwrap_or(self.keep_time));
        let sum = |side: &VecDeque<Execution>| -> Decimal {
            side.iter()
                .filter(|e| e.timestamp >= cutoff)
                .map(|e| e.amount)
                .sum()
        };
        (sum(&self.buys), sum(&self.sells))
    }

    /// Fills of a buy order: executions whose buy-side id matches, whether
    /// the order was taker (in `buys`) or maker (in `sells`).
    ///
    /// `None` when the order has no retained fills.
    pub fn reconcile_buy(&self, order_id: &str) -> Option<FillSummary> {
        FillSummary::from_fills(self.all().filter(|e| e.buy_order_id == *order_id))
    }

    /// Fills of a sell order, matched on the sell-side id.
    pub fn reconcile_sell(&self, order_id: &str) -> Option<FillSummary> {
        FillSummary::from_fills(self.all().filter(|e| e.sell_order_id == *order_id))
    }

    fn all(&self) -> impl Iterator<Item = &Execution> {
        self.buys.iter().chain(self.sells.iter())
    }

    /// True once a batch with at least one execution has been applied,
    /// false after a rejected batch.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Retained executions where the taker bought.
    pub fn buys(&self) -> &VecDeque<Execution> {
        &self.buys
    }

    /// Retained executions where the taker sold.
    pub fn sells(&self) -> &VecDeque<Execution> {
        &self.sells
    }

    /// The most recent batch in input order.
    pub fn event_values(&self) -> &[Execution] {
        &self.event_values
    }

    /// Total amount of the most recent batch.
    pub fn event_amount(&self) -> Decimal {
        self.event_amount
    }

    pub fn last_trade(&self) -> Option<LastTrade> {
        self.last_trade
    }

    pub fn keep_time(&self) -> Duration {
        self.keep_time
    }

    /// Takes effect at the next update.
    pub fn set_keep_time(&mut self, keep_time: Duration) {
        self.keep_time = keep_time;
    }
}

//! Real-time moving candle
//!
//! Builds an open/high/low/close summary from the tick samples retained by
//! a [`TickSeries`](crate::ticks::TickSeries). Unlike a fixed-boundary
//! candle, the window always ends at "now" and slides with every tick.
//! Uses `Decimal` for all arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::time::ExchangeTime;

use crate::ticks::TickSample;

/// Direction of the candle body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleColor {
    /// close > open
    Bullish,
    /// close < open
    Bearish,
    /// close == open
    Neutral,
}

/// A single OHLC candle with body and shadow measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// max(open, close)
    pub body_high: Decimal,
    /// min(open, close)
    pub body_low: Decimal,
    /// high − low
    pub range: Decimal,
    /// |close − open|
    pub body_range: Decimal,
    /// high − body_high
    pub upper_shadow: Decimal,
    /// body_low − low
    pub lower_shadow: Decimal,
    pub color: CandleColor,
    pub open_time: ExchangeTime,
    pub close_time: ExchangeTime,
    pub sample_count: usize,
}

impl Candle {
    /// Build a candle from samples in any order. `None` if empty.
    ///
    /// Samples are ordered by timestamp; ties keep their arrival order.
    pub fn from_samples(samples: &[TickSample]) -> Option<Self> {
        let mut ordered: Vec<&TickSample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.timestamp);

        let first = ordered.first()?;
        let last = ordered.last()?;
        let open = first.price;
        let close = last.price;

        let (high, low) = ordered.iter().fold((open, open), |(high, low), s| {
            (high.max(s.price), low.min(s.price))
        });

        let body_high = open.max(close);
        let body_low = open.min(close);
        let color = if close > open {
            CandleColor::Bullish
        } else if close < open {
            CandleColor::Bearish
        } else {
            CandleColor::Neutral
        };

        Some(Self {
            open,
            high,
            low,
            close,
            body_high,
            body_low,
            range: high - low,
            body_range: (close - open).abs(),
            upper_shadow: high - body_high,
            lower_shadow: body_low - low,
            color,
            open_time: first.timestamp,
            close_time: last.timestamp,
            sample_count: ordered.len(),
        })
    }

    /// Validate candle integrity (OHLC invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.body_high
            && self.body_high >= self.body_low
            && self.body_low >= self.low
            && self.upper_shadow >= Decimal::ZERO
            && self.lower_shadow >= Decimal::ZERO
            && self.close_time >= self.open_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32, price: i64) -> TickSample {
        TickSample {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, second)
                .unwrap(),
            price: Decimal::from(price),
        }
    }

    #[test]
    fn test_empty_samples() {
        assert!(Candle::from_samples(&[]).is_none());
    }

    #[test]
    fn test_bullish_candle() {
        let candle = Candle::from_samples(&[at(0, 100), at(1, 95), at(2, 110), at(3, 104)]).unwrap();

        assert_eq!(candle.open, Decimal::from(100));
        assert_eq!(candle.close, Decimal::from(104));
        assert_eq!(candle.high, Decimal::from(110));
        assert_eq!(candle.low, Decimal::from(95));
        assert_eq!(candle.body_high, Decimal::from(104));
        assert_eq!(candle.body_low, Decimal::from(100));
        assert_eq!(candle.range, Decimal::from(15));
        assert_eq!(candle.body_range, Decimal::from(4));
        assert_eq!(candle.upper_shadow, Decimal::from(6));
        assert_eq!(candle.lower_shadow, Decimal::from(5));
        assert_eq!(candle.color, CandleColor::Bullish);
        assert!(candle.is_valid());
    }

    #[test]
    fn test_bearish_candle() {
        let candle = Candle::from_samples(&[at(0, 100), at(1, 90)]).unwrap();
        assert_eq!(candle.color, CandleColor::Bearish);
        assert_eq!(candle.body_high, Decimal::from(100));
        assert_eq!(candle.body_low, Decimal::from(90));
        assert_eq!(candle.body_range, Decimal::from(10));
        assert_eq!(candle.upper_shadow, Decimal::ZERO);
        assert_eq!(candle.lower_shadow, Decimal::ZERO);
    }

    #[test]
    fn test_neutral_candle() {
        let candle = Candle::from_samples(&[at(0, 100), at(1, 120), at(2, 100)]).unwrap();
        assert_eq!(candle.color, CandleColor::Neutral);
        assert_eq!(candle.body_range, Decimal::ZERO);
        assert_eq!(candle.upper_shadow, Decimal::from(20));
    }

    #[test]
    fn test_samples_ordered_by_time() {
        // Arrival order differs from time order.
        let candle = Candle::from_samples(&[at(5, 130), at(1, 100), at(3, 90)]).unwrap();
        assert_eq!(candle.open, Decimal::from(100));
        assert_eq!(candle.close, Decimal::from(130));
        assert_eq!(candle.open_time, at(1, 0).timestamp);
        assert_eq!(candle.sample_count, 3);
    }
}

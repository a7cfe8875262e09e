//! Per-instrument depth book built from snapshot and diff messages
//!
//! Each side is a price-keyed `BTreeMap`, so levels are unique by price and
//! iterate in a deterministic order. Asks are read lowest-first and bids
//! highest-first. All arithmetic uses `Decimal`.
//!
//! The book processes:
//! - snapshot (`init`) → both sides replaced wholesale
//! - diff (`update`) → each incoming level replaces the level at its price;
//!   a zero size removes the level
//!
//! After every merge a side is capped to `max_len` levels and, when mid-price
//! filtering is enabled, stripped of levels on the wrong side of the mid.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::{relative_difference, to_percent};

/// Default number of levels kept per side.
pub const DEFAULT_MAX_LEN: usize = 300;

/// A single price level in the depth book.
///
/// On the wire a zero `size` means "remove this level"; a resting level
/// never has zero size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Whether this level is a removal marker.
    pub fn is_removal(&self) -> bool {
        self.size.is_zero()
    }
}

/// Which side of the book a `DepthSide` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    Ask,
    Bid,
}

/// One side of the depth book: price → size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSide {
    side: BookSide,
    levels: BTreeMap<Decimal, Decimal>,
}

impl DepthSide {
    fn new(side: BookSide) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> BookSide {
        self.side
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels from the best price outward.
    pub fn iter_best_first(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let levels = self.levels.iter().map(|(p, s)| PriceLevel::new(*p, *s));
        match self.side {
            BookSide::Ask => Box::new(levels),
            BookSide::Bid => Box::new(levels.rev()),
        }
    }

    /// Levels from the best price outward, collected.
    pub fn levels(&self) -> Vec<PriceLevel> {
        self.iter_best_first().collect()
    }

    /// Best (innermost) level.
    pub fn best(&self) -> Option<PriceLevel> {
        self.iter_best_first().next()
    }

    /// Size resting at `price`, if any.
    pub fn size_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Replace each incoming price; zero sizes delete.
    fn merge(&mut self, incoming: &[PriceLevel]) {
        for level in incoming {
            self.levels.remove(&level.price);
            if !level.is_removal() {
                self.levels.insert(level.price, level.size);
            }
        }
    }

    /// Drop everything strictly beyond the level at rank `max_len - 1`.
    fn cap(&mut self, max_len: usize) {
        if self.levels.len() <= max_len {
            return;
        }

        let cutoff = match max_len.checked_sub(1) {
            Some(rank) => self.iter_best_first().nth(rank).map(|l| l.price),
            None => None,
        };

        match (cutoff, self.side) {
            (Some(cutoff), BookSide::Ask) => self.levels.retain(|price, _| *price <= cutoff),
            (Some(cutoff), BookSide::Bid) => self.levels.retain(|price, _| *price >= cutoff),
            (None, _) => self.levels.clear(),
        }
    }

    /// Drop levels that cross the mid price.
    fn filter_mid(&mut self, mid: Decimal) {
        match self.side {
            BookSide::Ask => self.levels.retain(|price, _| *price > mid),
            BookSide::Bid => self.levels.retain(|price, _| *price < mid),
        }
    }

    /// Levels within `price_range` of the mid, best first. The mid itself is included.
    fn within(&self, mid: Decimal, price_range: Decimal) -> Vec<PriceLevel> {
        match self.side {
            BookSide::Ask => {
                let to = mid + price_range;
                self.levels
                    .range(mid..)
                    .take_while(|(price, _)| **price < to)
                    .map(|(p, s)| PriceLevel::new(*p, *s))
                    .collect()
            }
            BookSide::Bid => {
                let to = mid - price_range;
                self.levels
                    .range(..=mid)
                    .rev()
                    .take_while(|(price, _)| **price > to)
                    .map(|(p, s)| PriceLevel::new(*p, *s))
                    .collect()
            }
        }
    }
}

/// Book configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthConfig {
    /// Maximum levels per side.
    pub max_len: usize,
    /// Drop asks at or below mid and bids at or above mid.
    pub mid_price_filter: bool,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            mid_price_filter: true,
        }
    }
}

/// Depth book for a single instrument.
///
/// A side is `None` until a snapshot supplies it; this distinguishes "no
/// data yet" from "the book is empty".
#[derive(Debug, Clone)]
pub struct DepthBook {
    config: DepthConfig,
    mid_price: Option<Decimal>,
    asks: Option<DepthSide>,
    bids: Option<DepthSide>,
}

impl DepthBook {
    pub fn new(config: DepthConfig) -> Self {
        Self {
            config,
            mid_price: None,
            asks: None,
            bids: None,
        }
    }

    pub fn config(&self) -> &DepthConfig {
        &self.config
    }

    /// Apply a full snapshot.
    ///
    /// An empty raw list leaves that side as it was: unset before the first
    /// snapshot, otherwise the side from the previous one.
    pub fn init(&mut self, mid_price: Decimal, raw_asks: &[PriceLevel], raw_bids: &[PriceLevel]) {
        self.mid_price = Some(mid_price);
        if let Some(asks) = self.build_side(BookSide::Ask, raw_asks, mid_price) {
            self.asks = Some(asks);
        }
        if let Some(bids) = self.build_side(BookSide::Bid, raw_bids, mid_price) {
            self.bids = Some(bids);
        }
    }

    /// Apply a diff. Ignored until both sides have been set by a snapshot.
    pub fn update(&mut self, mid_price: Decimal, raw_asks: &[PriceLevel], raw_bids: &[PriceLevel]) {
        let config = self.config;
        let (Some(asks), Some(bids)) = (self.asks.as_mut(), self.bids.as_mut()) else {
            return;
        };

        self.mid_price = Some(mid_price);
        Self::apply(config, asks, raw_asks, mid_price);
        Self::apply(config, bids, raw_bids, mid_price);
    }

    /// Forget everything; the next snapshot starts afresh.
    pub fn reset(&mut self) {
        self.mid_price = None;
        self.asks = None;
        self.bids = None;
    }

    fn build_side(&self, side: BookSide, raw: &[PriceLevel], mid: Decimal) -> Option<DepthSide> {
        if raw.is_empty() {
            return None;
        }
        let mut built = DepthSide::new(side);
        Self::apply(self.config, &mut built, raw, mid);
        Some(built)
    }

    fn apply(config: DepthConfig, side: &mut DepthSide, incoming: &[PriceLevel], mid: Decimal) {
        side.merge(incoming);
        side.cap(config.max_len);
        if config.mid_price_filter {
            side.filter_mid(mid);
        }
    }

    /// Whether mid price and both sides are set.
    pub fn is_available(&self) -> bool {
        self.mid_price.is_some() && self.asks.is_some() && self.bids.is_some()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        self.mid_price
    }

    pub fn asks(&self) -> Option<&DepthSide> {
        self.asks.as_ref()
    }

    pub fn bids(&self) -> Option<&DepthSide> {
        self.bids.as_ref()
    }

    /// Ask levels (ascending price order); empty when unset.
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks.as_ref().map(DepthSide::levels).unwrap_or_default()
    }

    /// Bid levels (descending price order); empty when unset.
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids.as_ref().map(DepthSide::levels).unwrap_or_default()
    }

    /// Asks in `[mid, mid + price_range)` and bids in `(mid - price_range, mid]`.
    ///
    /// `None` when the book is unavailable.
    pub fn range(&self, price_range: Decimal) -> Option<DepthRange> {
        let (mid, asks, bids) = self.parts()?;
        Some(DepthRange {
            asks: asks.within(mid, price_range),
            bids: bids.within(mid, price_range),
        })
    }

    /// Spread measured at the first level on each side whose size exceeds
    /// the matching filter amount.
    ///
    /// `None` when the book is unavailable, a side is empty, or the rate
    /// cannot be computed.
    pub fn spread(
        &self,
        filter_ask_amount: Option<Decimal>,
        filter_bid_amount: Option<Decimal>,
    ) -> Option<SpreadInfo> {
        let (mid, asks, bids) = self.parts()?;
        let asks = asks.levels();
        let bids = bids.levels();
        let best_ask = asks.first()?.price;
        let best_bid = bids.first()?.price;

        let ask = SideSweep::measure(&asks, filter_ask_amount, mid)?;
        let bid = SideSweep::measure(&bids, filter_bid_amount, mid)?;

        Some(SpreadInfo {
            filter_ask_amount,
            filter_bid_amount,
            spread: ask.price - bid.price,
            spread_rate: relative_difference(ask.price, bid.price, "filtered spread rate").ok()?,
            best_spread: best_ask - best_bid,
            best_spread_rate: relative_difference(best_ask, best_bid, "best spread rate").ok()?,
            ask,
            bid,
        })
    }

    /// Size statistics over `range(price_range)`.
    pub fn statistics(&self, price_range: Decimal) -> Option<DepthStatistics> {
        let range = self.range(price_range)?;
        Some(DepthStatistics {
            asks: SizeStatistics::from_levels(&range.asks),
            bids: SizeStatistics::from_levels(&range.bids),
        })
    }

    fn parts(&self) -> Option<(Decimal, &DepthSide, &DepthSide)> {
        Some((self.mid_price?, self.asks.as_ref()?, self.bids.as_ref()?))
    }
}

impl Default for DepthBook {
    fn default() -> Self {
        Self::new(DepthConfig::default())
    }
}

/// The slice of the book around the mid price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRange {
    /// Asks in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    /// Bids in descending price order (best first).
    pub bids: Vec<PriceLevel>,
}

/// Sweep from the best level outward to the filtered top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSweep {
    /// Rank of the filtered top level (0 = best).
    pub index: usize,
    /// Price of the filtered top level.
    pub price: Decimal,
    /// Cumulative size from the best level through `index`, inclusive.
    pub swept_amount: Decimal,
    /// Absolute distance from the mid price.
    pub distance_from_mid: Decimal,
}

impl SideSweep {
    fn measure(levels: &[PriceLevel], filter: Option<Decimal>, mid: Decimal) -> Option<Self> {
        let index = filter
            .and_then(|amount| levels.iter().position(|l| l.size > amount))
            .unwrap_or(0);
        let top = levels.get(index)?;
        let swept_amount = levels[..=index].iter().map(|l| l.size).sum();

        Some(Self {
            index,
            price: top.price,
            swept_amount,
            distance_from_mid: (top.price - mid).abs(),
        })
    }
}

/// Spread information returned by [`DepthBook::spread`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadInfo {
    pub filter_ask_amount: Option<Decimal>,
    pub filter_bid_amount: Option<Decimal>,
    pub ask: SideSweep,
    pub bid: SideSweep,
    /// Filtered ask price minus filtered bid price.
    pub spread: Decimal,
    /// Filtered ask / filtered bid − 1.
    pub spread_rate: Decimal,
    /// Best ask minus best bid.
    pub best_spread: Decimal,
    /// Best ask / best bid − 1.
    pub best_spread_rate: Decimal,
}

impl SpreadInfo {
    /// `None` if the percentage overflows.
    pub fn spread_percent(&self) -> Option<Decimal> {
        to_percent(self.spread_rate).ok()
    }

    pub fn best_spread_percent(&self) -> Option<Decimal> {
        to_percent(self.best_spread_rate).ok()
    }
}

/// min / max / sum / mean / median of level sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizeStatistics {
    pub count: usize,
    pub min: Decimal,
    pub max: Decimal,
    pub sum: Decimal,
    pub mean: Decimal,
    pub median: Decimal,
}

impl SizeStatistics {
    /// Zeros for an empty slice.
    pub fn from_levels(levels: &[PriceLevel]) -> Self {
        let mut sizes: Vec<Decimal> = levels.iter().map(|l| l.size).collect();
        if sizes.is_empty() {
            return Self::default();
        }
        sizes.sort_unstable();

        let count = sizes.len();
        let sum: Decimal = sizes.iter().sum();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sizes[mid - 1] + sizes[mid]) / Decimal::TWO
        } else {
            sizes[mid]
        };

        Self {
            count,
            min: sizes[0],
            max: sizes[count - 1],
            sum,
            mean: sum / Decimal::from(count),
            median,
        }
    }
}

/// Per-side statistics returned by [`DepthBook::statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthStatistics {
    pub asks: SizeStatistics,
    pub bids: SizeStatistics,
}

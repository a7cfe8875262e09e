//! Settlement premium engine
//!
//! Tracks the disparity between the leveraged (FX) instrument's last price
//! and the spot price, maps it onto a stepped premium-rate ladder, and keeps
//! the spot-relative trigger prices at which the next tier would begin.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use types::errors::NumericError;
use types::numeric::{
    ceil_units, checked_product, checked_sum, floor_units, relative_difference, to_percent,
};

/// One rung of the premium ladder: disparity at or above `threshold`
/// pays `rate`, until the next rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumTier {
    pub threshold: Decimal,
    pub rate: Decimal,
}

/// Ascending premium ladder. Below the first threshold the rate is zero;
/// the last rung has no upper bound.
pub const TIER_LADDER: [PremiumTier; 4] = [
    // 5% .. 10%: 0.25%
    PremiumTier {
        threshold: Decimal::from_parts(5, 0, 0, false, 2),
        rate: Decimal::from_parts(25, 0, 0, false, 4),
    },
    // 10% .. 15%: 0.5%
    PremiumTier {
        threshold: Decimal::from_parts(10, 0, 0, false, 2),
        rate: Decimal::from_parts(50, 0, 0, false, 4),
    },
    // 15% .. 20%: 1%
    PremiumTier {
        threshold: Decimal::from_parts(15, 0, 0, false, 2),
        rate: Decimal::from_parts(100, 0, 0, false, 4),
    },
    // 20% and above: 2%
    PremiumTier {
        threshold: Decimal::from_parts(20, 0, 0, false, 2),
        rate: Decimal::from_parts(200, 0, 0, false, 4),
    },
];

/// Tier index (0..=4) and rate for a disparity rate.
///
/// The index is the number of thresholds the disparity has reached.
pub fn tier_for(disparity_rate: Decimal) -> (usize, Decimal) {
    let tier = TIER_LADDER
        .iter()
        .take_while(|t| disparity_rate >= t.threshold)
        .count();
    let rate = match tier {
        0 => Decimal::ZERO,
        n => TIER_LADDER[n - 1].rate,
    };
    (tier, rate)
}

/// Spot prices at which the disparity crosses one ladder boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerLevel {
    /// Tier entered when the boundary is crossed
    pub tier: usize,
    pub boundary: Decimal,
    pub rate: Decimal,
    /// floor(spot · (1 − boundary))
    pub buy_price: Decimal,
    /// ceil(spot · (1 + boundary))
    pub sell_price: Decimal,
}

/// Trigger prices relative to the current spot price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerLadder {
    pub spot_price: Decimal,
    /// floor(spot), the zero-disparity buy reference
    pub floor_reference: Decimal,
    /// ceil(spot), the zero-disparity sell reference
    pub ceil_reference: Decimal,
    pub levels: Vec<TriggerLevel>,
}

impl TriggerLadder {
    /// Fails if a trigger price overflows.
    pub fn for_spot(spot_price: Decimal) -> Result<Self, NumericError> {
        let levels = TIER_LADDER
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let below = Decimal::ONE - t.threshold;
                let above = checked_sum(Decimal::ONE, t.threshold, "trigger multiplier")?;
                Ok(TriggerLevel {
                    tier: i + 1,
                    boundary: t.threshold,
                    rate: t.rate,
                    buy_price: floor_units(checked_product(spot_price, below, "buy trigger")?),
                    sell_price: ceil_units(checked_product(spot_price, above, "sell trigger")?),
                })
            })
            .collect::<Result<Vec<_>, NumericError>>()?;

        Ok(Self {
            spot_price,
            floor_reference: floor_units(spot_price),
            ceil_reference: ceil_units(spot_price),
            levels,
        })
    }
}

/// Cross-market disparity and premium tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSpread {
    spot_price: Option<Decimal>,
    fx_price: Option<Decimal>,
    disparity_rate: Option<Decimal>,
    tier: Option<usize>,
    rate: Option<Decimal>,
    triggers: Option<TriggerLadder>,
}

impl SettlementSpread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the spot last-traded price and rebuild the trigger ladder.
    ///
    /// The ladder is cleared if a trigger price overflows.
    pub fn update_spot(&mut self, price: Decimal) {
        self.spot_price = Some(price);
        self.triggers = match TriggerLadder::for_spot(price) {
            Ok(ladder) => Some(ladder),
            Err(err) => {
                warn!(spot = %price, error = %err, "trigger ladder unavailable");
                None
            }
        };
        self.recompute();
    }

    /// Record the leveraged instrument's last-traded price.
    pub fn update_fx(&mut self, price: Decimal) {
        self.fx_price = Some(price);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.disparity_rate = match (self.fx_price, self.spot_price) {
            (Some(fx), Some(spot)) => relative_difference(fx, spot, "price disparity").ok(),
            _ => None,
        };

        match self.disparity_rate.map(tier_for) {
            Some((tier, rate)) => {
                self.tier = Some(tier);
                self.rate = Some(rate);
            }
            None => {
                self.tier = None;
                self.rate = None;
            }
        }
    }

    pub fn spot_price(&self) -> Option<Decimal> {
        self.spot_price
    }

    pub fn fx_price(&self) -> Option<Decimal> {
        self.fx_price
    }

    /// fx / spot − 1; unset until both prices are known.
    pub fn disparity_rate(&self) -> Option<Decimal> {
        self.disparity_rate
    }

    pub fn disparity_percent(&self) -> Option<Decimal> {
        self.disparity_rate.and_then(|r| to_percent(r).ok())
    }

    pub fn tier(&self) -> Option<usize> {
        self.tier
    }

    pub fn rate(&self) -> Option<Decimal> {
        self.rate
    }

    pub fn rate_percent(&self) -> Option<Decimal> {
        self.rate.and_then(|r| to_percent(r).ok())
    }

    /// Set by the first spot update.
    pub fn triggers(&self) -> Option<&TriggerLadder> {
        self.triggers.as_ref()
    }
}

//! Decimal helpers for prices, sizes and rates
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Every division is checked; a zero divisor is reported, never panicked on.
//! Products and sums of feed-supplied values go through the checked helpers
//! so an overflow surfaces as `NumericError::Overflow`.

use rust_decimal::Decimal;

use crate::errors::NumericError;

/// Multiplier from a rate to a percentage.
pub const PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// Round down to a whole currency unit.
pub fn floor_units(value: Decimal) -> Decimal {
    value.floor()
}

/// Round up to a whole currency unit.
pub fn ceil_units(value: Decimal) -> Decimal {
    value.ceil()
}

/// `numerator / denominator`, rejecting a zero denominator.
pub fn checked_ratio(
    numerator: Decimal,
    denominator: Decimal,
    context: &'static str,
) -> Result<Decimal, NumericError> {
    if denominator.is_zero() {
        return Err(NumericError::DivisionByZero { context });
    }
    numerator
        .checked_div(denominator)
        .ok_or(NumericError::Overflow { context })
}

/// `a * b`, reporting overflow.
pub fn checked_product(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, NumericError> {
    a.checked_mul(b).ok_or(NumericError::Overflow { context })
}

/// `a + b`, reporting overflow.
pub fn checked_sum(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, NumericError> {
    a.checked_add(b).ok_or(NumericError::Overflow { context })
}

/// Relative difference `numerator / denominator - 1`.
///
/// Used for spread rates (ask/bid) and price disparity (fx/spot).
pub fn relative_difference(
    numerator: Decimal,
    denominator: Decimal,
    context: &'static str,
) -> Result<Decimal, NumericError> {
    checked_ratio(numerator, denominator, context)?
        .checked_sub(Decimal::ONE)
        .ok_or(NumericError::Overflow { context })
}

/// Convert a rate (0.0025) into a percentage (0.25).
pub fn to_percent(rate: Decimal) -> Result<Decimal, NumericError> {
    checked_product(rate, PERCENT, "percentage")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_whole_unit_rounding() {
        assert_eq!(floor_units(dec("1049999.9")), dec("1049999"));
        assert_eq!(ceil_units(dec("1049999.1")), dec("1050000"));
        assert_eq!(floor_units(dec("100")), dec("100"));
        assert_eq!(ceil_units(dec("100")), dec("100"));
    }

    #[test]
    fn test_relative_difference_exact() {
        let rate = relative_difference(dec("1050000"), dec("1000000"), "test").unwrap();
        assert_eq!(rate, dec("0.05"));
    }

    #[test]
    fn test_zero_denominator_is_error() {
        let err = checked_ratio(Decimal::ONE, Decimal::ZERO, "spread rate").unwrap_err();
        assert_eq!(err, NumericError::DivisionByZero { context: "spread rate" });
    }

    #[test]
    fn test_checked_product_reports_overflow() {
        assert_eq!(checked_product(dec("2.5"), dec("4"), "notional").unwrap(), dec("10"));
        let err = checked_product(Decimal::MAX, Decimal::TWO, "notional").unwrap_err();
        assert_eq!(err, NumericError::Overflow { context: "notional" });
    }

    #[test]
    fn test_checked_sum_reports_overflow() {
        assert_eq!(checked_sum(dec("1.5"), dec("2"), "total").unwrap(), dec("3.5"));
        let err = checked_sum(Decimal::MAX, Decimal::ONE, "total").unwrap_err();
        assert_eq!(err, NumericError::Overflow { context: "total" });
    }

    #[test]
    fn test_to_percent() {
        assert_eq!(to_percent(dec("0.0025")).unwrap(), dec("0.25"));
        assert!(to_percent(Decimal::MAX).is_err());
    }

    proptest! {
        #[test]
        fn prop_floor_never_exceeds_ceil(units in -1_000_000_000i64..1_000_000_000, frac in 0u32..1000) {
            let value = Decimal::new(units * 1000 + frac as i64, 3);
            prop_assert!(floor_units(value) <= value);
            prop_assert!(ceil_units(value) >= value);
            prop_assert!(ceil_units(value) - floor_units(value) <= Decimal::ONE);
        }
    }
}

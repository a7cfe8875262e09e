//! Exchange-local timestamps
//!
//! The feed stamps every message in UTC with a sub-second fraction, e.g.
//! `2019-04-11T05:14:12.3739915Z`. The collector works in exchange-local
//! time, which is UTC shifted by a fixed nine hours. The shift is applied
//! literally, with no daylight-saving adjustment.

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};

use crate::errors::TimestampError;

/// A wall-clock instant in the exchange frame (UTC + 9h).
pub type ExchangeTime = NaiveDateTime;

/// Fixed offset of the exchange frame from UTC.
pub const EXCHANGE_UTC_OFFSET_HOURS: i64 = 9;

/// Fractional digits kept from feed timestamps.
pub const TIMESTAMP_PRECISION_DIGITS: u16 = 3;

/// Fractional digits kept on ledger executions (centiseconds).
pub const EXECUTION_PRECISION_DIGITS: u16 = 2;

const FEED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// The UTC → exchange-frame offset as a duration.
pub fn exchange_offset() -> Duration {
    Duration::hours(EXCHANGE_UTC_OFFSET_HOURS)
}

/// Shift a UTC instant into the exchange frame.
pub fn utc_to_exchange(utc: DateTime<Utc>) -> ExchangeTime {
    utc.naive_utc() + exchange_offset()
}

/// Parse a feed timestamp and shift it into the exchange frame.
///
/// The fraction is truncated to millisecond precision. A trailing `Z` is
/// accepted and ignored.
pub fn parse_exchange_timestamp(raw: &str) -> Result<ExchangeTime, TimestampError> {
    parse_exchange_timestamp_with_precision(raw, TIMESTAMP_PRECISION_DIGITS)
}

/// Like [`parse_exchange_timestamp`], keeping `digits` fractional digits.
pub fn parse_exchange_timestamp_with_precision(
    raw: &str,
    digits: u16,
) -> Result<ExchangeTime, TimestampError> {
    let trimmed = raw.trim();
    let body = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    let utc = NaiveDateTime::parse_from_str(body, FEED_TIMESTAMP_FORMAT)
        .map_err(|_| TimestampError::Malformed { raw: raw.to_string() })?
        .trunc_subsecs(digits);

    utc.checked_add_signed(exchange_offset())
        .ok_or_else(|| TimestampError::OutOfRange { raw: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Timelike};

    #[test]
    fn test_parse_applies_fixed_offset() {
        let ts = parse_exchange_timestamp("2019-04-11T05:14:12.373Z").unwrap();
        let expected = NaiveDate::from_ymd_opt(2019, 4, 11)
            .unwrap()
            .and_hms_milli_opt(14, 14, 12, 373)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_truncates_to_milliseconds() {
        let ts = parse_exchange_timestamp("2019-04-11T05:14:12.3739915Z").unwrap();
        assert_eq!(ts.nanosecond(), 373_000_000);
    }

    #[test]
    fn test_parse_execution_precision_truncates_to_centiseconds() {
        let raw = "2019-04-11T05:14:12.3789Z";
        let ts = parse_exchange_timestamp_with_precision(raw, EXECUTION_PRECISION_DIGITS).unwrap();
        assert_eq!(ts.nanosecond(), 370_000_000);
        assert_eq!(ts.hour(), 14);

        let ms = parse_exchange_timestamp(raw).unwrap();
        assert_eq!(ms.nanosecond(), 378_000_000);
    }

    #[test]
    fn test_parse_crosses_date_boundary() {
        let ts = parse_exchange_timestamp("2019-12-31T20:00:00.0").unwrap();
        let expected = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_without_fraction() {
        let ts = parse_exchange_timestamp("2019-04-11T05:14:12").unwrap();
        assert_eq!(ts.hour(), 14);
        assert_eq!(ts.nanosecond(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_exchange_timestamp("not-a-time").unwrap_err();
        assert!(matches!(err, TimestampError::Malformed { .. }));
    }

    #[test]
    fn test_utc_to_exchange() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let local = utc_to_exchange(utc);
        assert_eq!(local.to_string(), "2024-03-11 08:30:00");
    }
}

//! Shared helpers: Decimal ↔ f64 conversions for stored soil values and
//! ISO 8601 timestamp parsing for device-supplied observation times.
//!
//! Soil values are stored as NUMERIC. They are rounded to 2 decimal places on
//! the way in (sensor resolution is well below that) and read back as f64 for
//! feature assembly. Non-finite inputs are rejected upstream by the soil-value
//! parser, so conversion here only warns and returns `None` for them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Convert an f64 to Decimal, rounded to 2 decimal places.
///
/// Returns `None` for non-finite inputs (NaN, ±Inf).
pub(crate) fn f64_to_decimal_2dp(v: f64) -> Option<Decimal> {
    if !v.is_finite() {
        tracing::warn!("f64_to_decimal_2dp received non-finite value {}, dropping", v);
        return None;
    }
    Decimal::from_f64(v).map(|d| d.round_dp(2))
}

/// Convert an Option<Decimal> to Option<f64>.
pub(crate) fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

/// Parse an ISO 8601 timestamp into UTC.
///
/// Accepts RFC 3339 (`2025-04-01T06:30:00Z`, `2025-04-01T12:00:00+05:30`),
/// offset-less date-times (interpreted as UTC, with or without fractional
/// seconds) and bare dates (midnight UTC).
pub(crate) fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_f64_to_decimal_2dp_rounds() {
        assert_eq!(
            f64_to_decimal_2dp(5.556),
            Some(Decimal::from_str("5.56").unwrap())
        );
    }

    #[test]
    fn test_f64_to_decimal_2dp_non_finite() {
        assert_eq!(f64_to_decimal_2dp(f64::NAN), None);
        assert_eq!(f64_to_decimal_2dp(f64::INFINITY), None);
    }

    #[test]
    fn test_opt_conversions() {
        assert_eq!(opt_dec_to_f64(None), None);
        let d = Decimal::from_str("40.5").unwrap();
        assert!((opt_dec_to_f64(Some(d)).unwrap() - 40.5).abs() < 1e-10);
    }

    #[test]
    fn test_parse_iso8601_zulu() {
        let dt = parse_iso8601("2025-04-01T06:30:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-04-01T06:30:00+00:00");
    }

    #[test]
    fn test_parse_iso8601_offset_normalised_to_utc() {
        let dt = parse_iso8601("2025-04-01T12:00:00+05:30").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-04-01T06:30:00+00:00");
    }

    #[test]
    fn test_parse_iso8601_naive_and_fractional() {
        assert!(parse_iso8601("2025-04-01T06:30:00").is_some());
        assert!(parse_iso8601("2025-04-01T06:30:00.123456").is_some());
    }

    #[test]
    fn test_parse_iso8601_date_only() {
        let dt = parse_iso8601("2025-04-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-04-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_iso8601_rejects_garbage() {
        assert_eq!(parse_iso8601("yesterday"), None);
        assert_eq!(parse_iso8601("2025-13-01T00:00:00Z"), None);
        assert_eq!(parse_iso8601(""), None);
    }
}

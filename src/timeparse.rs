//! Datetime normalization for trip timestamps.
//!
//! Source files use one of two fixed formats, with or without seconds. Which
//! one is inferred from the first data row of each file: 16 characters or
//! fewer means no seconds. Files never mix formats; if one does, the mismatch
//! propagates as an error rather than being silently coerced, since a wrong
//! guess corrupts every timestamp in the file.

use chrono::{Duration, NaiveDateTime, Timelike, Utc};

use crate::config::ReconConfig;
use crate::error::IngestError;

pub const FORMAT_WITH_SECONDS: &str = "%d/%m/%Y %H:%M:%S";
pub const FORMAT_MINUTES: &str = "%d/%m/%Y %H:%M";

/// Picks the date format for a file from its first timestamp value.
pub fn infer_format(sample: &str) -> &'static str {
    if sample.trim().len() > 16 {
        FORMAT_WITH_SECONDS
    } else {
        FORMAT_MINUTES
    }
}

/// Parses a timestamp in the inferred format and rounds it to the nearest
/// minute.
pub fn parse_minute(value: &str, format: &'static str) -> Result<NaiveDateTime, IngestError> {
    let parsed = NaiveDateTime::parse_from_str(value.trim(), format).map_err(|_| {
        IngestError::DateFormat {
            value: value.to_string(),
            format,
        }
    })?;
    Ok(round_to_minute(parsed))
}

fn round_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    let truncated = ts
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts);
    if ts.second() >= 30 {
        truncated + Duration::minutes(1)
    } else {
        truncated
    }
}

/// True if `ts` falls inside the plausible window: on or after the scheme
/// launch date and not in the future. Rows outside it are data entry noise.
pub fn within_window(ts: NaiveDateTime, config: &ReconConfig) -> bool {
    let earliest = config
        .earliest_plausible
        .and_hms_opt(0, 0, 0)
        .unwrap_or(NaiveDateTime::MIN);
    ts >= earliest && ts <= Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_infer_format_by_length() {
        assert_eq!(infer_format("14/06/2021 08:03:27"), FORMAT_WITH_SECONDS);
        assert_eq!(infer_format("14/06/2021 08:03"), FORMAT_MINUTES);
        // Single-digit day still fits the short format
        assert_eq!(infer_format("4/06/2021 08:03"), FORMAT_MINUTES);
    }

    #[test]
    fn test_parse_rounds_down_below_half_minute() {
        let ts = parse_minute("14/06/2021 08:03:27", FORMAT_WITH_SECONDS).unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 6, 14)
            .unwrap()
            .and_hms_opt(8, 3, 0)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_rounds_up_from_half_minute() {
        let ts = parse_minute("14/06/2021 08:03:30", FORMAT_WITH_SECONDS).unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 6, 14)
            .unwrap()
            .and_hms_opt(8, 4, 0)
            .unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_minute_format_passes_through() {
        let ts = parse_minute("14/06/2021 08:03", FORMAT_MINUTES).unwrap();
        assert_eq!(ts.minute(), 3);
        assert_eq!(ts.second(), 0);
    }

    #[test]
    fn test_format_mismatch_is_an_error() {
        // File inferred as seconds-format, later row without seconds
        let result = parse_minute("14/06/2021 08:03", FORMAT_WITH_SECONDS);
        assert!(matches!(result, Err(IngestError::DateFormat { .. })));
    }

    #[test]
    fn test_window_rejects_prehistory_and_future() {
        let config = crate::config::ReconConfig::builtin();
        let before_launch = NaiveDate::from_ymd_opt(2009, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let in_range = NaiveDate::from_ymd_opt(2019, 5, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let future = NaiveDate::from_ymd_opt(2100, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(!within_window(before_launch, &config));
        assert!(within_window(in_range, &config));
        assert!(!within_window(future, &config));
    }
}

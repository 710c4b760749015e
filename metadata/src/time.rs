use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Parses a timestamp that is either a plain `YYYY-MM-DD` date (taken as UTC
/// midnight) or a full RFC 3339 timestamp.
pub fn parse_flexible_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .with_context(|| format!("could not parse timestamp {value:?}"))
}

/// Parses a flexible timestamp and keeps its UTC calendar date.
pub fn parse_flexible_date(value: &str) -> Result<NaiveDate> {
    Ok(parse_flexible_timestamp(value)?.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_plain_date_is_utc_midnight() {
        let parsed = parse_flexible_timestamp("2026-01-02").unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(parsed.hour(), 0);
        assert_eq!(parsed.minute(), 0);
    }

    #[test]
    fn test_rfc3339_with_offset() {
        let parsed = parse_flexible_timestamp("2026-01-02T10:30:00+02:00").unwrap();
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parse_flexible_date("2026-01-02T23:59:59Z").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_flexible_timestamp("january 2nd").is_err());
        assert!(parse_flexible_timestamp("2026-13-01").is_err());
        assert!(parse_flexible_timestamp("").is_err());
    }
}

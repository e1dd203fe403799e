//! Conversions between human-entered dates and ledger timestamps.

use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::errors::{CertifierError, Result};

/// `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp, as epoch seconds.
pub fn parse_graduation_date(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let seconds = if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        date.and_time(NaiveTime::MIN).and_utc().timestamp()
    } else {
        DateTime::parse_from_rfc3339(trimmed)
            .map_err(|_| {
                CertifierError::Validation(format!("unrecognised graduation date {input:?}"))
            })?
            .timestamp()
    };

    u64::try_from(seconds).map_err(|_| {
        CertifierError::Validation(format!("graduation date {input:?} is before 1970"))
    })
}

/// Calendar day (UTC) of a ledger timestamp.
pub fn calendar_date(epoch_seconds: u64) -> Option<NaiveDate> {
    let secs = i64::try_from(epoch_seconds).ok()?;
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

/// `dd/mm/yyyy`, empty only when the timestamp is out of chrono's range.
pub fn display_date(epoch_seconds: u64) -> String {
    calendar_date(epoch_seconds)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

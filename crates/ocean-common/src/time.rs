//! Time handling for search windows and dataset timestamps.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Parse a timestamp as served by ERDDAP, Axiom or a local CSV file.
///
/// Accepts RFC 3339, naive `T`- or space-separated datetimes (assumed UTC)
/// and bare dates (midnight UTC).
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Format a timestamp the way ERDDAP query strings expect it.
pub fn format_iso(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// An inclusive time window for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse a window from `min_time` / `max_time` strings.
    pub fn parse(min_time: &str, max_time: &str) -> Result<Self, TimeParseError> {
        let start = parse_datetime(min_time)?;
        let end = parse_datetime(max_time)?;
        if start > end {
            return Err(TimeParseError::Inverted {
                start: min_time.to_string(),
                end: max_time.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window used when a station query gives no times: 1900-01-01 to 2100-12-31.
    pub fn all_time() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            end: Utc.with_ymd_and_hms(2100, 12, 31, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    /// The last `weeks` weeks up to today, both ends at midnight UTC.
    pub fn recent_weeks(weeks: i64) -> Self {
        let today = Utc::now().date_naive();
        let end = Utc.from_utc_datetime(&today.and_hms_opt(0, 0, 0).unwrap_or_default());
        Self {
            start: end - Duration::weeks(weeks),
            end,
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    /// Window bounds as whole seconds since the Unix epoch.
    pub fn epoch_seconds(&self) -> (i64, i64) {
        (self.start.timestamp(), self.end.timestamp())
    }

    pub fn start_iso(&self) -> String {
        format_iso(&self.start)
    }

    pub fn end_iso(&self) -> String {
        format_iso(&self.end)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Time window start {start} is after end {end}")]
    Inverted { start: String, end: String },
}

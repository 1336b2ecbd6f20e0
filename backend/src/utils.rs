use chrono::{DateTime, SecondsFormat, Utc};

pub fn ms_since_epoch() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// ISO-8601 with second precision, the form the dashboard and CSV export
/// expect ("2025-08-08T12:30:00+00:00").
pub fn iso8601(ms: i64) -> String {
    datetime_from_ms(ms).to_rfc3339_opts(SecondsFormat::Secs, false)
}

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Naive layouts accepted for timestamps written by older tooling.
/// These carry no offset and are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a timestamp as written in task files or returned by GitHub.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`, `...+02:00`) and the naive ISO
/// layouts in [`NAIVE_FORMATS`]. Returns `None` for anything else.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way it is written into task files.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time, formatted for a `Last Synced` line.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

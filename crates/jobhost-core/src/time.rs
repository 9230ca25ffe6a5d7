//! Timestamp encoding shared by every table.
//!
//! Stored as RFC3339 UTC with millisecond precision and a `Z` suffix, so the
//! text form has a fixed width and string comparison in SQL matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp. Any RFC3339 offset is accepted and normalised to UTC.
pub fn from_db(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn now_db() -> String {
    to_db(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_width_and_sortable() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        assert_eq!(to_db(a), "2026-03-01T09:00:00.000Z");
        assert!(to_db(a) < to_db(b));
        assert_eq!(to_db(a).len(), to_db(b).len());
    }

    #[test]
    fn parses_other_offsets() {
        let parsed = from_db("2026-03-01T10:00:00+01:00").unwrap();
        assert_eq!(to_db(parsed), "2026-03-01T09:00:00.000Z");
        assert!(from_db("yesterday").is_none());
    }
}

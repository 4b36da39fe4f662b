// src/ingest/timestamp.rs
//! Tolerant creation-timestamp parsing with timezone normalization.
//!
//! Rule, in order:
//! 1. The string carries an explicit offset → honour it.
//! 2. No parseable offset, but a UTC marker (`+0000`, `GMT`, `UTC`) → strip the
//!    marker, parse the rest as naive, interpret as UTC.
//! 3. Otherwise → interpret the naive value as process-local time.
//!
//! Step 2 is a compatibility shim for endpoints that emit UTC without a
//! machine-readable offset; getting it wrong shifts records by the local
//! offset and misclassifies fresh records as stale.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

/// How the offset was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TzOrigin {
    Explicit,
    UtcMarker,
    AssumedLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTimestamp {
    /// Normalized to the local clock; compares as an instant.
    pub local: DateTime<Local>,
    pub origin: TzOrigin,
}

const OFFSET_FORMATS: &[&str] = &[
    "%a %b %d %H:%M:%S %z %Y",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%a %b %d %H:%M:%S %Y",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn utc_marker_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\s*\+0000\s*$|\s*\b(GMT|UTC)\b)").unwrap())
}

/// Parse a string timestamp. `None` means no format matched.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(dt) = parse_with_offset(s) {
        return Some(ParsedTimestamp {
            local: dt.with_timezone(&Local),
            origin: TzOrigin::Explicit,
        });
    }

    let re = utc_marker_re();
    if re.is_match(s) {
        let stripped = re.replace_all(s, " ");
        let stripped = collapse_ws(&stripped);
        let naive = parse_naive(&stripped)?;
        return Some(ParsedTimestamp {
            local: Utc.from_utc_datetime(&naive).with_timezone(&Local),
            origin: TzOrigin::UtcMarker,
        });
    }

    let naive = parse_naive(s)?;
    // DST gaps have no local representation; ambiguous folds take the earlier one.
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(ParsedTimestamp {
        local,
        origin: TzOrigin::AssumedLocal,
    })
}

/// JSON-level entry point: strings go through [`parse_timestamp`], numbers are
/// Unix epoch seconds (or milliseconds when clearly too large for seconds).
pub fn parse_timestamp_value(v: &Value) -> Option<ParsedTimestamp> {
    match v {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            let dt = if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()?
            } else {
                Utc.timestamp_opt(raw, 0).single()?
            };
            Some(ParsedTimestamp {
                local: dt.with_timezone(&Local),
                origin: TzOrigin::Explicit,
            })
        }
        _ => None,
    }
}

fn parse_with_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(s, f).ok())
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim().trim_end_matches('Z');
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn social_feed_format_with_offset() {
        let p = parse_timestamp("Tue Oct 14 12:00:00 +0000 2025").unwrap();
        assert_eq!(p.origin, TzOrigin::Explicit);
        assert_eq!(p.local.with_timezone(&Utc), utc(2025, 10, 14, 12, 0, 0));
    }

    #[test]
    fn rfc2822_and_rfc3339() {
        let a = parse_timestamp("Tue, 14 Oct 2025 14:00:00 +0200").unwrap();
        let b = parse_timestamp("2025-10-14T12:00:00Z").unwrap();
        let c = parse_timestamp("Tue, 14 Oct 2025 12:00:00 GMT").unwrap();
        assert_eq!(a.local, b.local);
        assert_eq!(b.local, c.local);
    }

    #[test]
    fn utc_marker_without_numeric_offset() {
        let p = parse_timestamp("2025-10-14 12:00:00 UTC").unwrap();
        assert_eq!(p.origin, TzOrigin::UtcMarker);
        assert_eq!(p.local.with_timezone(&Utc), utc(2025, 10, 14, 12, 0, 0));

        let p = parse_timestamp("Tue Oct 14 12:00:00 GMT 2025").unwrap();
        assert_eq!(p.origin, TzOrigin::UtcMarker);
        assert_eq!(p.local.with_timezone(&Utc), utc(2025, 10, 14, 12, 0, 0));
    }

    #[test]
    fn bare_string_is_local() {
        let p = parse_timestamp("2025-10-14 12:00:00").unwrap();
        assert_eq!(p.origin, TzOrigin::AssumedLocal);
        let naive = NaiveDate::from_ymd_opt(2025, 10, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(p.local.naive_local(), naive);
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday-ish").is_none());
        assert!(parse_timestamp_value(&Value::Bool(true)).is_none());
    }

    #[test]
    fn epoch_numbers() {
        let s = parse_timestamp_value(&serde_json::json!(1_760_443_200)).unwrap();
        let ms = parse_timestamp_value(&serde_json::json!(1_760_443_200_000i64)).unwrap();
        assert_eq!(s.local, ms.local);
        assert_eq!(s.local.with_timezone(&Utc), utc(2025, 10, 14, 12, 0, 0));
    }
}

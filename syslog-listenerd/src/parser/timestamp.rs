//! Timestamp resolution for the matcher chain.
//!
//! Every input resolves to an instant: anything unparseable becomes the
//! datagram's receipt time. Timezone-naive timestamps are read as UTC, never
//! as local time.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use super::matchers::MatcherKind;

/// Yearless timestamps landing further than this past receipt belong to the previous year
const FUTURE_TOLERANCE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimestamp {
    pub instant: DateTime<Utc>,
    /// True when a timestamp token was present but could not be parsed
    pub fallback: bool,
}

impl ResolvedTimestamp {
    fn parsed(instant: DateTime<Utc>) -> Self {
        Self { instant, fallback: false }
    }
}

/// Resolve a timestamp token produced by the matcher of the given kind.
///
/// `None` (absent or NILVALUE) yields the receipt time without the fallback
/// flag; a present but unparseable token yields the receipt time with it.
pub fn resolve(token: Option<&str>, kind: MatcherKind, received_at: DateTime<Utc>) -> ResolvedTimestamp {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return ResolvedTimestamp::parsed(received_at);
    };

    let parsed = match kind {
        MatcherKind::Rfc5424 => parse_iso8601(token),
        MatcherKind::Rfc3164 | MatcherKind::NoPriority => parse_bsd(token, received_at),
        MatcherKind::Enhanced => {
            parse_bsd(token, received_at).or_else(|| parse_iso8601(token))
        }
        MatcherKind::Raw => None,
    };

    match parsed {
        Some(instant) => ResolvedTimestamp::parsed(instant),
        None => {
            tracing::debug!("Unparseable {} timestamp {:?}, using receipt time", kind, token);
            ResolvedTimestamp { instant: received_at, fallback: true }
        }
    }
}

/// ISO 8601 / RFC 3339 with `T` or space separator, any fractional precision,
/// and an optional `Z` or numeric offset.
pub fn parse_iso8601(token: &str) -> Option<DateTime<Utc>> {
    let mut s = token.trim().to_string();

    if s.len() > 10 && s.as_bytes()[10] == b' ' {
        s.replace_range(10..11, "T");
    }
    if s.ends_with('Z') || s.ends_with('z') {
        s.pop();
        s.push_str("+00:00");
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(&s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// BSD `MMM DD HH:MM:SS` (no year). The year comes from the receipt time,
/// stepping back one year when the result would sit more than a day in the
/// future (a December message received in January).
pub fn parse_bsd(token: &str, received_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{} {}", year, normalized), "%Y %b %d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    };

    let limit = received_at + chrono::Duration::hours(FUTURE_TOLERANCE_HOURS);
    let year = received_at.year();

    with_year(year)
        .filter(|instant| *instant <= limit)
        .or_else(|| with_year(year - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn july(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 7, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bsd_in_the_future_uses_previous_year() {
        let ts = resolve(Some("Dec 15 10:30:45"), MatcherKind::Rfc3164, july(2025));
        assert!(!ts.fallback);
        assert_eq!(ts.instant, Utc.with_ymd_and_hms(2024, 12, 15, 10, 30, 45).unwrap());
    }

    #[test]
    fn test_bsd_in_the_past_uses_current_year() {
        let ts = resolve(Some("Jun 20 18:07:02"), MatcherKind::NoPriority, july(2025));
        assert_eq!(ts.instant, Utc.with_ymd_and_hms(2025, 6, 20, 18, 7, 2).unwrap());
    }

    #[test]
    fn test_bsd_within_a_day_stays_in_current_year() {
        let received = Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap();
        let ts = resolve(Some("Mar  2 10:00:00"), MatcherKind::Rfc3164, received);
        assert_eq!(ts.instant, Utc.with_ymd_and_hms(2025, 3, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_bsd_new_year_wraparound() {
        let received = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 5).unwrap();
        let ts = resolve(Some("Dec 31 23:59:58"), MatcherKind::Rfc3164, received);
        assert_eq!(ts.instant, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 58).unwrap());
    }

    #[test]
    fn test_bsd_single_digit_space_padded_day() {
        let ts = parse_bsd("Jan  5 01:02:03", july(2025)).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 5, 1, 2, 3).unwrap());
    }

    #[test]
    fn test_iso_preserves_milliseconds() {
        let ts = resolve(Some("2024-12-15T10:30:45.123Z"), MatcherKind::Rfc5424, july(2025));
        assert!(!ts.fallback);
        assert_eq!(
            ts.instant,
            Utc.with_ymd_and_hms(2024, 12, 15, 10, 30, 45).unwrap()
                + chrono::Duration::milliseconds(123)
        );
        assert_eq!(ts.instant.nanosecond(), 123_000_000);
    }

    #[test]
    fn test_iso_offsets_and_separators() {
        let expected = Utc.with_ymd_and_hms(2024, 12, 15, 9, 30, 45).unwrap();
        assert_eq!(parse_iso8601("2024-12-15T10:30:45+01:00"), Some(expected));
        assert_eq!(parse_iso8601("2024-12-15 09:30:45Z"), Some(expected));
        assert_eq!(parse_iso8601("2024-12-15 09:30:45"), Some(expected));
        assert_eq!(parse_iso8601("  2024-12-15T09:30:45  "), Some(expected));
    }

    #[test]
    fn test_iso_microsecond_precision() {
        let ts = parse_iso8601("2003-08-24T05:14:15.000003-07:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2003, 8, 24, 12, 14, 15).unwrap() + chrono::Duration::microseconds(3));
    }

    #[test]
    fn test_unparseable_falls_back_to_receipt() {
        let received = july(2025);
        let ts = resolve(Some("yesterday-ish"), MatcherKind::Rfc5424, received);
        assert_eq!(ts, ResolvedTimestamp { instant: received, fallback: true });
    }

    #[test]
    fn test_absent_token_is_not_a_fallback() {
        let received = july(2025);
        let ts = resolve(None, MatcherKind::Rfc5424, received);
        assert_eq!(ts, ResolvedTimestamp { instant: received, fallback: false });
    }

    #[test]
    fn test_enhanced_accepts_either_grammar() {
        let received = july(2025);
        let bsd = resolve(Some("Jun 21 08:07:44"), MatcherKind::Enhanced, received);
        assert_eq!(bsd.instant, Utc.with_ymd_and_hms(2025, 6, 21, 8, 7, 44).unwrap());
        let iso = resolve(Some("2025-06-21T08:07:44Z"), MatcherKind::Enhanced, received);
        assert_eq!(iso.instant, Utc.with_ymd_and_hms(2025, 6, 21, 8, 7, 44).unwrap());
    }
}

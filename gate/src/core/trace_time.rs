//! UTC timestamp helpers for trace manifests.
//!
//! Start times are always interpreted as UTC. A timestamp without an explicit
//! offset is still UTC, never host-local time.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format as RFC 3339 with a `Z` suffix and whole seconds.
pub fn format_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compact UTC form used inside trace ids (`20261019T120000Z`).
pub fn compact_utc(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Parse a manifest timestamp, forcing UTC for offset-less forms.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Whole seconds between `started_at` and `now`, clamped at zero.
///
/// Returns `None` when the start timestamp cannot be parsed.
pub fn duration_secs(started_at: &str, now: DateTime<Utc>) -> Option<i64> {
    let start = parse_utc(started_at)?;
    Some((now - start).num_seconds().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn formats_with_z_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 5).unwrap();
        assert_eq!(format_utc(at), "2026-10-19T12:00:05Z");
        assert_eq!(compact_utc(at), "20261019T120005Z");
    }

    #[test]
    fn duration_from_utc_start_sixty_seconds_ago() {
        let now = Utc::now();
        let started = format_utc(now - Duration::seconds(60));
        let secs = duration_secs(&started, now).expect("duration");
        assert!((58..=62).contains(&secs), "got {secs}");
    }

    #[test]
    fn offsetless_timestamp_is_treated_as_utc() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 1, 0).unwrap();
        assert_eq!(duration_secs("2026-10-19T12:00:00", now), Some(60));
        assert_eq!(duration_secs("2026-10-19 12:00:00", now), Some(60));
    }

    #[test]
    fn explicit_offset_is_normalized() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 1, 0).unwrap();
        assert_eq!(duration_secs("2026-10-19T14:00:00+02:00", now), Some(60));
    }

    #[test]
    fn future_start_clamps_to_zero_and_garbage_is_none() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(duration_secs("2026-10-19T13:00:00Z", now), Some(0));
        assert_eq!(duration_secs("yesterday", now), None);
    }
}

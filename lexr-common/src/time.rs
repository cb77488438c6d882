//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Compact UTC stamp with milliseconds used to name per-run artifacts
/// (e.g. `20260301T141502123Z`)
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_run_stamp_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 14, 15, 2).unwrap() + chrono::Duration::milliseconds(123);
        assert_eq!(run_stamp(at), "20260301T141502123Z");
    }

    #[test]
    fn test_run_stamps_differ_within_one_second() {
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let second = first + chrono::Duration::milliseconds(1);
        assert_ne!(run_stamp(first), run_stamp(second));
        assert!(run_stamp(first) < run_stamp(second));
    }

    #[test]
    fn test_run_stamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert!(run_stamp(earlier) < run_stamp(later));
    }
}

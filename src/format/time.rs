//! Wall-clock timestamp formatting.

use chrono::{DateTime, Utc};

/// Formats a nanosecond Unix timestamp as `YYYYMMDDTHHMMSS.NNNNNNNNN`,
/// zero-padded to 4/2/2/2/2/2/9 digits.
///
/// A timestamp that chrono cannot represent (wildly out of range) falls
/// back to the Unix epoch rather than panicking, matching the "clock read
/// failure -> use zero timestamp and continue" recovery policy.
pub fn format_timestamp_ns(timestamp_ns: i64) -> String {
    let secs = timestamp_ns.div_euclid(1_000_000_000);
    let nanos = timestamp_ns.rem_euclid(1_000_000_000) as u32;
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs, nanos).unwrap_or_else(|| {
        DateTime::from_timestamp(0, 0).expect("epoch is always representable")
    });
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:09}",
        dt.format("%Y"),
        dt.format("%m"),
        dt.format("%d"),
        dt.format("%H"),
        dt.format("%M"),
        dt.format("%S"),
        nanos
    )
}

/// Returns the current wall-clock time as nanoseconds since the Unix epoch.
///
/// Returns `None` on clock read failure (practically unreachable on
/// supported platforms, but producers must still handle it per the
/// recovery policy: "use zero timestamp and continue").
pub fn now_ns() -> Option<i64> {
    let now = std::time::SystemTime::now();
    let dur = now.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(dur.as_nanos()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_timestamp_ns(0), "19700101T000000.000000000");
    }

    #[test]
    fn test_format_preserves_nanos() {
        let s = format_timestamp_ns(1_700_000_000_123_456_789);
        assert!(s.ends_with(".123456789"));
        assert_eq!(s.len(), "YYYYMMDDTHHMMSS.NNNNNNNNN".len());
    }

    #[test]
    fn test_now_ns_is_recent() {
        let n = now_ns().expect("clock should be readable in tests");
        assert!(n > 1_700_000_000_000_000_000);
    }
}

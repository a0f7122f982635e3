//! Wall-clock time for message timestamps.
//!
//! Only display uses the wall clock. Escalation timing runs on the
//! monotonic clock held by [`crate::alarm::AlarmSession`].

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tokio::time::Instant;

/// Source of the timestamp embedded in notification messages.
pub trait WallClock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The host clock, shown at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// A wall clock pinned to `base` at construction that then advances with
/// tokio's clock. Under paused test time it is fully deterministic.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    base: OffsetDateTime,
    start: Instant,
}

impl AnchoredClock {
    pub fn new(base: OffsetDateTime) -> Self {
        Self {
            base,
            start: Instant::now(),
        }
    }
}

impl WallClock for AnchoredClock {
    fn now(&self) -> OffsetDateTime {
        self.base + self.start.elapsed()
    }
}

/// `HH:MM:SS`, the way the messages have always shown it.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| at.time().to_string())
}

/// Parse a `+HH:MM` / `-HH:MM` offset.
pub fn parse_utc_offset(raw: &str) -> Result<UtcOffset, time::error::Parse> {
    UtcOffset::parse(
        raw.trim(),
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
}

/// The host's local offset, or UTC when it cannot be determined.
///
/// Must be called before the runtime spawns extra threads; the `time` crate
/// refuses to read the offset from a multi-threaded process.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_case::test_case;
    use time::macros::{datetime, offset};

    use super::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_timestamp(datetime!(2022-02-08 07:05:09 UTC)), "07:05:09");
    }

    #[test_case("-07:00", offset!(-7); "negative")]
    #[test_case("+05:30", offset!(+5:30); "half hour")]
    #[test_case(" +00:00 ", UtcOffset::UTC; "padded utc")]
    fn parses_offsets(raw: &str, expected: UtcOffset) {
        assert_eq!(parse_utc_offset(raw).unwrap(), expected);
    }

    #[test_case("7"; "bare hour")]
    #[test_case("PST"; "zone name")]
    fn rejects_malformed_offsets(raw: &str) {
        assert!(parse_utc_offset(raw).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_tokio_time() {
        let clock = AnchoredClock::new(datetime!(2022-02-08 23:59:30 -8));

        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(format_timestamp(clock.now()), "00:00:15");
    }
}

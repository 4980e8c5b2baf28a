//! Time sources
//!
//! Scheduling uses the monotonic clock; timestamps stored in record state and
//! notifications use the absolute clock. Both come from one [`Clock`] so
//! tests can substitute them together.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of absolute and monotonic time
pub trait Clock: Send + Sync {
    /// Wall-clock time for timestamps
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time for interval bookkeeping
    ///
    /// Uses tokio's `Instant` so paused-time tests can drive it.
    fn instant(&self) -> Instant;
}

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Immutable facts about the running process, injected where they are reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Version string of the running build
    pub version: String,
    /// When the process started
    pub started_at: DateTime<Utc>,
}

impl RuntimeInfo {
    /// Capture runtime info for a process starting now
    pub fn new(version: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            version: version.into(),
            started_at: clock.now(),
        }
    }

    /// Seconds since start, as seen by `clock`
    pub fn uptime_secs(&self, clock: &dyn Clock) -> i64 {
        clock
            .now()
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }
    }

    #[test]
    fn test_uptime() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let info = RuntimeInfo::new("0.1.0", &FixedClock(start));

        let later = FixedClock(start + chrono::Duration::seconds(90));
        assert_eq!(info.uptime_secs(&later), 90);

        let earlier = FixedClock(start - chrono::Duration::seconds(5));
        assert_eq!(info.uptime_secs(&earlier), 0);
    }
}

//! Wall-clock seam.

/// Source of millisecond timestamps for log entries and canonical rows.
///
/// Production uses [`SystemClock`]; tests substitute a stepped clock so
/// timestamps are deterministic.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

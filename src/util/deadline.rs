//! Absolute deadlines for bounded waits.

use std::time::Duration;

use tokio::time::Instant;

/// Roughly 30 years; stands in for "never" without overflowing `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Point in time after which a wait is abandoned.
///
/// Built on `tokio::time::Instant`, so paused test clocks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now. Saturates instead of overflowing.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(
            now.checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        )
    }

    /// Deadline at a fixed instant.
    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// The underlying instant.
    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Whether the deadline has passed.
    pub fn is_reached(self) -> bool {
        Instant::now() >= self.0
    }

    /// Time remaining, zero once reached.
    pub fn time_left(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

//! Timeouts and kernel tick arithmetic.
//!
//! Blocking operations take a [`Timeout`]. Host threads resolve it against the
//! monotonic clock; the kernel resolves it against its tick counter using the
//! configured tick period.

use core::time::Duration;
use std::time::Instant;

/// Kernel time, in ticks since the kernel started.
pub type Ticks = u64;

/// How long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately if the operation cannot complete.
    NoWait,
    /// Wait at most the given duration.
    After(Duration),
    /// Wait without bound. Appropriate for permanent prerequisites only.
    Forever,
}

impl Timeout {
    pub const fn from_millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }

    /// Absolute wall-clock deadline, or `None` for [`Timeout::Forever`] and
    /// for durations past the clock's range.
    pub fn deadline_from(self, now: Instant) -> Option<Instant> {
        match self {
            Self::NoWait => Some(now),
            Self::After(d) => now.checked_add(d),
            Self::Forever => None,
        }
    }

    /// Absolute tick deadline, or `None` for [`Timeout::Forever`].
    pub fn deadline_ticks(self, now: Ticks, tick_period: Duration) -> Option<Ticks> {
        match self {
            Self::NoWait => Some(now),
            Self::After(d) => Some(now.saturating_add(duration_to_ticks(d, tick_period))),
            Self::Forever => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        Self::After(value)
    }
}

/// Converts a duration into whole ticks, rounding up so a sleep never ends
/// early.
pub fn duration_to_ticks(d: Duration, tick_period: Duration) -> Ticks {
    let period = tick_period.as_nanos().max(1);
    let nanos = d.as_nanos();
    let ticks = nanos.div_ceil(period);
    ticks.min(Ticks::MAX as u128) as Ticks
}

pub fn ticks_to_duration(ticks: Ticks, tick_period: Duration) -> Duration {
    let nanos = tick_period.as_nanos().saturating_mul(ticks as u128);
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

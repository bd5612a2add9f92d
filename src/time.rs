/// Simulated time for the event scheduler.
///
/// Represents a logical timestamp with no dependency on the wall clock.
/// Time advances only when the scheduler dispatches an event, never from
/// wall-clock observation.
use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point on the simulated time axis, in nanoseconds since the origin.
///
/// Integral on purpose: two events computed to fall on "the same" instant
/// land in the same bucket, which floating-point seconds cannot promise.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// The origin of simulated time.
    pub const ZERO: SimTime = SimTime(0);

    /// The last representable instant.
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros * 1_000)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs * NANOS_PER_SEC)
    }

    /// Convert fractional seconds, rounding to the nearest nanosecond.
    ///
    /// Negative and NaN inputs saturate to [`SimTime::ZERO`], values past the
    /// representable range saturate to [`SimTime::MAX`].
    pub fn from_secs_f64(secs: f64) -> Self {
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos.is_nan() || nanos <= 0.0 {
            SimTime::ZERO
        } else if nanos >= u64::MAX as f64 {
            SimTime::MAX
        } else {
            SimTime(nanos as u64)
        }
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Advance time by `delay`.
    /// Returns `None` when the result does not fit the time axis.
    #[inline]
    pub fn checked_add(self, delay: Duration) -> Option<SimTime> {
        let delta = u64::try_from(delay.as_nanos()).ok()?;
        self.0.checked_add(delta).map(SimTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: SimTime) -> bool {
        self.0 < other.0
    }

    /// Returns the span between two points in time.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={:.9}s", self.as_secs_f64())
    }
}

impl From<Duration> for SimTime {
    /// Interpret a duration as an offset from the origin, saturating at
    /// [`SimTime::MAX`].
    fn from(d: Duration) -> Self {
        SimTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

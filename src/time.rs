/// Virtual time for the scenario kernel.
///
/// A logical timestamp in nanoseconds with no dependency on `std::time`.
/// Time advances only when the scheduler dispatches events, never from
/// wall-clock observation.
use serde::{Deserialize, Serialize};

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point on the simulation clock, nanosecond resolution.
///
/// Delays are plain `u64` nanosecond counts; use the `*_to_nanos`
/// helpers to build them from coarser units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The far end of the clock. Used as "never" by idle channels.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        VirtualTime(micros.saturating_mul(NANOS_PER_MICRO))
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        VirtualTime(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        VirtualTime(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Convert fractional seconds, as accepted on the command line.
    ///
    /// Returns `None` for negative, non-finite, or out-of-range input.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos > u64::MAX as f64 {
            return None;
        }
        Some(VirtualTime(nanos as u64))
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0 / NANOS_PER_MICRO
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Advance time by `delta` nanoseconds.
    /// Returns `None` on overflow.
    #[inline]
    pub fn advance(self, delta: u64) -> Option<VirtualTime> {
        self.0.checked_add(delta).map(VirtualTime)
    }

    /// Like `advance`, clamped to [`VirtualTime::MAX`].
    #[inline]
    pub fn saturating_advance(self, delta: u64) -> VirtualTime {
        VirtualTime(self.0.saturating_add(delta))
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// Nanoseconds elapsed since `earlier`.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

/// Milliseconds to a nanosecond delay.
#[inline]
pub fn millis_to_nanos(millis: u64) -> u64 {
    millis.saturating_mul(NANOS_PER_MILLI)
}

/// Seconds to a nanosecond delay.
#[inline]
pub fn secs_to_nanos(secs: u64) -> u64 {
    secs.saturating_mul(NANOS_PER_SEC)
}

/// Time to put `bytes` on a link running at `bits_per_sec`.
///
/// Rounds up so a frame never finishes early. A zero rate is treated as
/// instantaneous.
pub fn serialization_delay(bytes: usize, bits_per_sec: u64) -> u64 {
    if bits_per_sec == 0 {
        return 0;
    }
    let bits = (bytes as u128) * 8 * NANOS_PER_SEC as u128;
    let rate = bits_per_sec as u128;
    let nanos = bits.div_ceil(rate);
    u64::try_from(nanos).unwrap_or(u64::MAX)
}

impl std::fmt::Display for VirtualTime {
    /// Formats as `+2s`, `+2.5s`, `+0.000192s`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(VirtualTime::ZERO.as_nanos(), 0);
    }

    #[test]
    fn test_unit_constructors_agree() {
        assert_eq!(VirtualTime::from_secs(2), VirtualTime::from_millis(2_000));
        assert_eq!(VirtualTime::from_millis(3), VirtualTime::from_micros(3_000));
        assert_eq!(VirtualTime::from_secs(1).as_nanos(), 1_000_000_000);
    }

    #[test]
    fn test_from_secs_f64() {
        assert_eq!(VirtualTime::from_secs_f64(10.0), Some(VirtualTime::from_secs(10)));
        assert_eq!(
            VirtualTime::from_secs_f64(2.5),
            Some(VirtualTime::from_millis(2_500))
        );
        assert_eq!(VirtualTime::from_secs_f64(-1.0), None);
        assert_eq!(VirtualTime::from_secs_f64(f64::NAN), None);
        assert_eq!(VirtualTime::from_secs_f64(f64::INFINITY), None);
    }

    #[test]
    fn test_ordering() {
        let t1 = VirtualTime::from_secs(1);
        let t2 = VirtualTime::from_secs(2);
        assert!(t1 < t2);
        assert!(t1.is_before(t2));
        assert!(!t2.is_before(t1));
    }

    #[test]
    fn test_advance_overflow() {
        assert!(VirtualTime::MAX.advance(1).is_none());
        assert_eq!(VirtualTime::MAX.saturating_advance(1), VirtualTime::MAX);
    }

    #[test]
    fn test_duration_since() {
        let t1 = VirtualTime::from_millis(10);
        let t2 = VirtualTime::from_millis(30);
        assert_eq!(t2.duration_since(t1), Some(millis_to_nanos(20)));
        assert_eq!(t1.duration_since(t2), None);
    }

    #[test]
    fn test_serialization_delay() {
        // 1250 bytes at 10 Mbit/s is exactly 1 ms.
        assert_eq!(serialization_delay(1250, 10_000_000), millis_to_nanos(1));
        // 127 bytes at 250 kbit/s: 4.064 ms.
        assert_eq!(serialization_delay(127, 250_000), 4_064_000);
        assert_eq!(serialization_delay(100, 0), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtualTime::from_secs(2).to_string(), "+2s");
        assert_eq!(VirtualTime::from_millis(2_500).to_string(), "+2.5s");
    }
}

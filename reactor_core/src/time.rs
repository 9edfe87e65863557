//! The `(time, microstep)` tag algebra (§3, §4.1).
//!
//! All arithmetic on logical time is signed 64-bit nanoseconds, with
//! `Timestamp::FOREVER` as the saturating sentinel for "no upper bound".

use std::cmp::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in logical (or physical) time, in nanoseconds.
///
/// Signed so that relative offsets (deltas between two timestamps) can be
/// negative, matching the `interval_t` (`int64_t`) of the source runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Self = Self(0);
    /// Sentinel meaning "no upper bound"; all tag arithmetic saturates here.
    pub const FOREVER: Self = Self(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// The current wall-clock instant, expressed as nanoseconds since the
    /// UNIX epoch. This is the host-provided `physical_now()` of §6.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the UNIX epoch");
        Self(
            since_epoch
                .as_nanos()
                .try_into()
                .expect("system clock overflowed i64 nanoseconds"),
        )
    }

    /// Saturating add of a (possibly negative) interval.
    pub fn saturating_add(self, interval: i64) -> Self {
        match self.0.checked_add(interval) {
            Some(n) => Self(n.min(Self::FOREVER.0)),
            None => Self::FOREVER,
        }
    }

    pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_nanos((self.0 - earlier.0) as u64))
        } else {
            None
        }
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self(d.as_nanos().try_into().unwrap_or(i64::MAX))
    }
}

impl std::ops::Sub for Timestamp {
    type Output = i64;

    fn sub(self, rhs: Self) -> i64 {
        self.0 - rhs.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A `(time, microstep)` pair that totally orders every event in the system
/// (§3). Lexicographic: `time` dominates, `microstep` breaks ties at the same
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    time: Timestamp,
    microstep: u32,
}

impl Tag {
    /// The tag of program start: time zero, microstep zero.
    pub const ZERO: Self = Self {
        time: Timestamp::ZERO,
        microstep: 0,
    };

    /// The largest representable tag; nothing may be scheduled beyond it.
    pub const FOREVER: Self = Self {
        time: Timestamp::FOREVER,
        microstep: u32::MAX,
    };

    pub const fn new(time: Timestamp, microstep: u32) -> Self {
        Self { time, microstep }
    }

    pub const fn time(&self) -> Timestamp {
        self.time
    }

    pub const fn microstep(&self) -> u32 {
        self.microstep
    }

    /// `tag_compare(a, b) -> {-1, 0, 1}` per §4.1, expressed as the idiomatic
    /// `Ordering` (callers that want the literal `{-1,0,1}` contract can map
    /// it with `Ordering::as_sign` below).
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    /// `tag_add(tag, interval) -> tag`, saturating at `Timestamp::FOREVER`
    /// (§4.1). Does not touch the microstep.
    pub fn add_interval(&self, interval: i64) -> Self {
        Self {
            time: self.time.saturating_add(interval),
            microstep: self.microstep,
        }
    }

    /// `tag_delay(tag, delay) -> tag` per §4.1: a positive delay advances
    /// time and resets the microstep to zero; a zero delay holds time fixed
    /// and advances the microstep by one (the "superdense time" step).
    pub fn delay(&self, delay: i64) -> Self {
        if delay > 0 {
            Self {
                time: self.time.saturating_add(delay),
                microstep: 0,
            }
        } else {
            Self {
                time: self.time,
                microstep: self.microstep.saturating_add(1),
            }
        }
    }

    /// Saturating difference between two tags' time components, clamped to
    /// zero when `self` is not after `earlier`. Used by MIT enforcement,
    /// which only cares whether enough time has elapsed.
    pub fn time_since(&self, earlier: Self) -> i64 {
        (self.time - earlier.time).max(0)
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.microstep.cmp(&other.microstep))
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.time, self.microstep)
    }
}

/// Maps an [`Ordering`] to the `{-1, 0, 1}` contract of `tag_compare` (§4.1)
/// for callers that need the literal integer, e.g. when embedding this crate
/// behind an FFI boundary for a code generator.
pub fn ordering_as_sign(ord: Ordering) -> i32 {
    match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_add_saturates_at_forever() {
        let t = Tag::new(Timestamp::from_nanos(i64::MAX - 5), 0);
        let added = t.add_interval(100);
        assert_eq!(added.time(), Timestamp::FOREVER);
    }

    #[test]
    fn tag_delay_zero_bumps_microstep() {
        let t = Tag::new(Timestamp::from_nanos(10), 3);
        let delayed = t.delay(0);
        assert_eq!(delayed, Tag::new(Timestamp::from_nanos(10), 4));
    }

    #[test]
    fn tag_delay_positive_advances_time_and_resets_microstep() {
        let t = Tag::new(Timestamp::from_nanos(10), 3);
        let delayed = t.delay(5);
        assert_eq!(delayed, Tag::new(Timestamp::from_nanos(15), 0));
    }

    #[test]
    fn tag_ordering_is_lexicographic() {
        let a = Tag::new(Timestamp::from_nanos(5), 9);
        let b = Tag::new(Timestamp::from_nanos(6), 0);
        assert!(a < b);

        let c = Tag::new(Timestamp::from_nanos(5), 1);
        assert!(c < a);
    }

    #[test]
    fn tag_compare_matches_sign_contract() {
        let a = Tag::ZERO;
        let b = Tag::ZERO.delay(1);
        assert_eq!(ordering_as_sign(a.compare(&b)), -1);
        assert_eq!(ordering_as_sign(a.compare(&a)), 0);
        assert_eq!(ordering_as_sign(b.compare(&a)), 1);
    }
}

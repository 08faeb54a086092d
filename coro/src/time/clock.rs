use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::Duration;

/// A point on, or a span of, the monotonic clock, in microseconds.
///
/// The same type serves for instants ([`Time::now`]) and durations; their
/// difference is again a `Time`. Values are signed, so subtracting a later
/// instant yields a negative span rather than wrapping.
///
/// # Examples
///
/// ```rust,ignore
/// let deadline = Time::now() + Time::millisec(250);
/// assert!(deadline > Time::now());
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    micros: i64,
}

impl Time {
    /// Zero: the clock's epoch, or an empty span.
    pub const ZERO: Time = Time { micros: 0 };

    /// A span of whole seconds.
    pub const fn sec(seconds: i64) -> Self {
        Self {
            micros: seconds.saturating_mul(1_000_000),
        }
    }

    /// A span of whole milliseconds.
    pub const fn millisec(millis: i64) -> Self {
        Self {
            micros: millis.saturating_mul(1_000),
        }
    }

    /// A span of whole microseconds.
    pub const fn microsec(micros: i64) -> Self {
        Self { micros }
    }

    /// Reads the monotonic clock.
    pub fn now() -> Self {
        Self {
            micros: i64::try_from(now_nanos() / 1_000).unwrap_or(i64::MAX),
        }
    }

    /// The first microsecond at which at least `duration` has passed from
    /// now, measured in nanoseconds.
    pub(crate) fn deadline_after(duration: Duration) -> Self {
        let micros = (now_nanos() + duration.as_nanos()).div_ceil(1_000);

        Self {
            micros: i64::try_from(micros).unwrap_or(i64::MAX),
        }
    }

    pub const fn as_micros(self) -> i64 {
        self.micros
    }

    pub const fn as_millis(self) -> i64 {
        self.micros / 1_000
    }

    /// Converts a span to a [`Duration`]; negative spans become zero.
    pub fn to_duration(self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }
}

fn now_nanos() -> u128 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    debug_assert_eq!(rc, 0, "clock_gettime(CLOCK_MONOTONIC) failed");

    (ts.tv_sec as u128) * 1_000_000_000 + ts.tv_nsec as u128
}

impl From<Duration> for Time {
    /// Truncates to whole microseconds, saturating at `i64::MAX`.
    fn from(duration: Duration) -> Self {
        Self {
            micros: i64::try_from(duration.as_micros()).unwrap_or(i64::MAX),
        }
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time {
            micros: self.micros.saturating_add(rhs.micros),
        }
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time {
            micros: self.micros.saturating_sub(rhs.micros),
        }
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        *self = *self - rhs;
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.micros)
    }
}

use std::fmt;

use libc::{time_t, timeval};

#[derive(Debug, Default, Clone, Copy)]
/// Timestamp consisting of a seconds and a microseconds component
///
/// Capture drivers stamp buffers against the monotonic clock origin.
pub struct Timestamp {
    pub sec: time_t,
    pub usec: time_t,
}

impl Timestamp {
    /// Returns a timestamp representation
    ///
    /// # Arguments
    ///
    /// * `sec` - Seconds
    /// * `usec` - Microseconds
    pub const fn new(sec: time_t, usec: time_t) -> Self {
        Timestamp { sec, usec }
    }

    /// Nanoseconds since the monotonic clock origin.
    pub fn as_nanos(&self) -> u64 {
        self.sec.max(0) as u64 * 1_000_000_000 + self.usec.max(0) as u64 * 1_000
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let floating: f64 = self.sec as f64 + self.usec as f64 / 1_000_000.0;
        write!(f, "{} [s]", floating)
    }
}

impl From<timeval> for Timestamp {
    fn from(tv: timeval) -> Self {
        Timestamp {
            sec: tv.tv_sec as time_t,
            usec: tv.tv_usec as time_t,
        }
    }
}

impl From<Timestamp> for timeval {
    fn from(ts: Timestamp) -> Self {
        timeval {
            tv_sec: ts.sec,
            tv_usec: ts.usec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanosecond_conversion() {
        let ts = Timestamp::new(2, 500_000);
        assert_eq!(ts.as_nanos(), 2_500_000_000);
    }

    #[test]
    fn negative_components_clamp_to_zero() {
        let ts = Timestamp::new(-1, -1);
        assert_eq!(ts.as_nanos(), 0);
    }
}

//! Distance-to-delay model.
//!
//! Round-trip time is modelled as a linear regression over distance,
//! `rtt = 10.89ms + 0.02ms/km * distance`, and each link carries half of it.
//! Arithmetic is done in fixed point so the rounding to two decimals is exact
//! (half away from zero) instead of depending on binary floating point.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Regression intercept in units of 1e-4 ms (10.89 ms).
const RTT_BASE: u64 = 108_900;
/// Regression slope in units of 1e-4 ms per kilometer (0.02 ms/km).
const RTT_PER_KM: u64 = 200;

/// One-way link delay with a resolution of 10 microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkDelay {
    hundredths_ms: u64,
}

impl LinkDelay {
    pub fn from_hundredths_ms(hundredths_ms: u64) -> Self {
        Self { hundredths_ms }
    }

    pub fn hundredths_ms(&self) -> u64 {
        self.hundredths_ms
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.hundredths_ms * 10)
    }

    /// Delay in microseconds, the unit handed to `tc netem`.
    pub fn as_micros(&self) -> u64 {
        self.hundredths_ms * 10
    }
}

impl fmt::Display for LinkDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}ms", self.hundredths_ms / 100, self.hundredths_ms % 100)
    }
}

impl Serialize for LinkDelay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One-way delay of a link spanning `distance_km`.
///
/// ```
/// use edgesim::topology::latency::link_delay;
///
/// assert_eq!(link_delay(0).to_string(), "5.45ms");
/// assert_eq!(link_delay(1000).to_string(), "15.45ms");
/// ```
pub fn link_delay(distance_km: u32) -> LinkDelay {
    let rtt = RTT_BASE + RTT_PER_KM * u64::from(distance_km);
    // rtt / 2 in 1e-4 ms, rounded to 1e-2 ms
    LinkDelay::from_hundredths_ms((rtt + 100) / 200)
}

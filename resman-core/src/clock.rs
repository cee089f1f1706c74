use std::fmt;

use serde::{Deserialize, Serialize};

pub const NANOS_PER_SECOND: u32 = 1_000_000_000;
pub const NANOS_PER_HALF_SECOND: u32 = 500_000_000;

/// A logical-clock reading, distinct from wall time. Invariant:
/// `nanoseconds < 1_000_000_000`. Ordering is (seconds, nanoseconds).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime {
    pub seconds: u32,
    pub nanoseconds: u32,
}

impl SimTime {
    pub const ZERO: SimTime = SimTime {
        seconds: 0,
        nanoseconds: 0,
    };

    pub fn new(seconds: u32, nanoseconds: u32) -> Self {
        debug_assert!(nanoseconds < NANOS_PER_SECOND);
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// This reading plus `ns` nanoseconds, carrying overflow into seconds.
    pub fn plus_nanos(self, ns: u64) -> SimTime {
        let total = self.nanoseconds as u64 + ns;
        SimTime {
            seconds: self.seconds + (total / NANOS_PER_SECOND as u64) as u32,
            nanoseconds: (total % NANOS_PER_SECOND as u64) as u32,
        }
    }

    /// Whole half-second periods elapsed since time zero. Used for the
    /// snapshot cadence.
    pub fn half_seconds(&self) -> u64 {
        self.seconds as u64 * 2 + u64::from(self.nanoseconds >= NANOS_PER_HALF_SECOND)
    }

    /// This reading in whole simulated milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.seconds as u64 * 1_000 + (self.nanoseconds / 1_000_000) as u64
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.nanoseconds)
    }
}

/// The simulated system clock. Only the master holds one, and every
/// mutation goes through [`SimClock::advance`], so monotonicity is
/// structural.
#[derive(Debug, Default)]
pub struct SimClock {
    now: SimTime,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Advance by `ns` nanoseconds and return the new reading.
    pub fn advance(&mut self, ns: u32) -> SimTime {
        self.now = self.now.plus_nanos(ns as u64);
        self.now
    }
}

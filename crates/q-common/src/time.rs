// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Time utilities for Qbitel EdgeOS
//!
//! Check durations are tracked in microseconds and lock waits in
//! milliseconds. With the `std` feature the module also provides a
//! monotonic stopwatch and the wall-clock used for attestation timestamps.

use core::ops::{Add, Sub};
use core::time::Duration;

/// Duration in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Millis(u32);

impl Millis {
    /// Create from milliseconds
    #[must_use]
    pub const fn new(ms: u32) -> Self {
        Self(ms)
    }

    /// Get as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u32 {
        self.0
    }

    /// Convert to a `core::time::Duration` for lock waits
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0 as u64)
    }

    /// Zero duration
    pub const ZERO: Self = Self(0);
}

impl From<u32> for Millis {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Duration in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Micros(u64);

impl Micros {
    /// Create from microseconds
    #[must_use]
    pub const fn new(us: u64) -> Self {
        Self(us)
    }

    /// Convert from a `Duration`, saturating at `u64::MAX`
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }

    /// Get as microseconds
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get as milliseconds (truncated)
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Zero duration
    pub const ZERO: Self = Self(0);
}

impl From<u64> for Micros {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add for Micros {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Micros {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// Monotonic stopwatch for check timing
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(std::time::Instant);

#[cfg(feature = "std")]
impl Stopwatch {
    /// Start timing now
    #[must_use]
    pub fn start() -> Self {
        Self(std::time::Instant::now())
    }

    /// Time elapsed since `start`
    #[must_use]
    pub fn elapsed(&self) -> Micros {
        Micros::from_duration(self.0.elapsed())
    }
}

/// Seconds since the Unix epoch, truncated to 32 bits
///
/// Returns 0 if the system clock is set before the epoch.
#[cfg(feature = "std")]
#[must_use]
pub fn unix_time_secs() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as u32)
}

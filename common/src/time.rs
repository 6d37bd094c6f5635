//! Local and network-adjusted time, mirroring the teacher's `block::time`
//! module: peers contribute clock samples which are combined into a median
//! used to bound block timestamps (spec §4.2: "the remote clock sample is
//! added to a network median time source").
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time, expressed as seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalTime(u64);

impl LocalTime {
    pub fn from_secs(secs: u64) -> Self {
        LocalTime(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is set before 1970")
            .as_secs();
        LocalTime(secs)
    }
}

impl std::ops::Add<u64> for LocalTime {
    type Output = LocalTime;
    fn add(self, rhs: u64) -> LocalTime {
        LocalTime(self.0 + rhs)
    }
}

impl std::ops::Sub for LocalTime {
    type Output = i64;
    fn sub(self, rhs: LocalTime) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

/// Reads the current time. Production code uses [`SystemClock`]; tests use a
/// fixed or steppable clock to make timing-dependent logic deterministic.
pub trait Clock: Send + Sync {
    fn local_time(&self) -> LocalTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time(&self) -> LocalTime {
        LocalTime::now()
    }
}

/// A clock whose value advances only when explicitly told to, for
/// deterministic tests of timer-driven logic (trickle, rebroadcast, GBT
/// staleness).
#[derive(Debug)]
pub struct TestClock(std::sync::atomic::AtomicU64);

impl TestClock {
    pub fn new(start: LocalTime) -> Self {
        TestClock(std::sync::atomic::AtomicU64::new(start.as_secs()))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Clock for TestClock {
    fn local_time(&self) -> LocalTime {
        LocalTime::from_secs(self.0.load(std::sync::atomic::Ordering::Relaxed))
    }
}

/// Maximum allowed drift between a peer's claimed clock offset and ours
/// before we stop counting their sample (70 minutes, matching upstream).
const TIMESTAMP_WINDOW: i64 = 70 * 60;

/// Combines clock-offset samples from connected peers into a median used to
/// validate block timestamps, replacing the source's single global mutable
/// "median time" with an owned, per-node value.
#[derive(Debug, Default)]
pub struct AdjustedClock<C> {
    inner: C,
    samples: Vec<i64>,
}

impl<C: Clock> AdjustedClock<C> {
    pub fn new(inner: C) -> Self {
        AdjustedClock { inner, samples: Vec::new() }
    }

    /// Record the clock offset implied by a peer's `version.timestamp`.
    pub fn add_sample(&mut self, offset: i64) {
        if offset.abs() <= TIMESTAMP_WINDOW {
            if self.samples.len() >= 200 {
                self.samples.remove(0);
            }
            self.samples.push(offset);
        }
    }

    /// The local clock adjusted by the median of collected peer offsets.
    pub fn local_time(&self) -> LocalTime {
        let local = self.inner.local_time();
        if self.samples.is_empty() {
            return local;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let median = sorted[sorted.len() / 2];
        local + median.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjusted_clock_uses_median_offset() {
        let mut clock = AdjustedClock::new(TestClock::new(LocalTime::from_secs(1_000)));
        clock.add_sample(10);
        clock.add_sample(20);
        clock.add_sample(30);
        assert_eq!(clock.local_time(), LocalTime::from_secs(1_020));
    }

    #[test]
    fn adjusted_clock_ignores_samples_outside_window() {
        let mut clock = AdjustedClock::new(TestClock::new(LocalTime::from_secs(1_000)));
        clock.add_sample(TIMESTAMP_WINDOW + 1);
        assert_eq!(clock.local_time(), LocalTime::from_secs(1_000));
    }
}

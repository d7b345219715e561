//! Time source abstraction and bucket arithmetic

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;

/// Source of "now" for components that make time-based decisions
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Round `t` down to a multiple of `resolution` counted from the Unix epoch.
///
/// A non-positive resolution leaves `t` unchanged.
pub fn truncate(t: DateTime<Utc>, resolution: TimeDelta) -> DateTime<Utc> {
    let span = match resolution.num_nanoseconds() {
        Some(span) if span > 0 => span as i128,
        _ => return t,
    };

    let nanos = t.timestamp() as i128 * 1_000_000_000 + t.timestamp_subsec_nanos() as i128;
    // rem_euclid keeps pre-epoch instants flooring downwards
    let offset = nanos.rem_euclid(span) as i64;
    t - TimeDelta::nanoseconds(offset)
}

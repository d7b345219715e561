//! Time-windowed sample storage
//!
//! Samples are kept in two generations split by a tick line that moves in
//! resolution-sized steps. Eviction swaps the generations instead of
//! filtering, so writers never pay for a scan.
//!
//! ```text
//!  resolution = 60s, now = 70s
//!
//!          start          tick line
//!   p1  |  p2             ||  p3                        |
//! ------------------------------------------------------> t
//!  0  5    10             60      70                  120
//!                                 ^ now
//! ```
//!
//! At `now = 70` anything observed before `10` is no longer relevant, so
//! only `p2` and `p3` are returned by [`WindowedStore::get`].

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use index_core::{truncate, Clock, CoreError, CoreResult, Sample, SystemClock};

/// What happened to a sample handed to [`WindowedStore::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Older than the retention window; dropped without being stored
    Stale,
}

#[derive(Debug)]
struct Generations {
    before_tick: Vec<Sample>,
    after_tick: Vec<Sample>,
    tick_line: DateTime<Utc>,
}

/// Concurrent store holding only samples within one resolution of now
#[derive(Debug)]
pub struct WindowedStore {
    resolution: TimeDelta,
    clock: Arc<dyn Clock>,
    generations: RwLock<Generations>,

    accepted: AtomicU64,
    rejected_stale: AtomicU64,
    evictions: AtomicU64,
}

impl WindowedStore {
    pub fn new(resolution: Duration) -> CoreResult<Self> {
        Self::with_clock(resolution, Arc::new(SystemClock))
    }

    pub fn with_clock(resolution: Duration, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        let resolution = to_time_delta(resolution)?;
        let tick_line = truncate(clock.now(), resolution);

        Ok(Self {
            resolution,
            clock,
            generations: RwLock::new(Generations {
                before_tick: Vec::new(),
                after_tick: Vec::new(),
                tick_line,
            }),
            accepted: AtomicU64::new(0),
            rejected_stale: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Insert a sample, first advancing the tick line if the clock has moved
    /// a whole resolution past it. The sample is judged against the tick
    /// line in force after the advance.
    pub fn add(&self, sample: Sample) -> Admission {
        let current_tick = truncate(self.clock.now(), self.resolution);
        let observed_at = sample.observed_at;

        let (admission, advanced) = {
            let mut gens = self.generations.write();

            let mut advanced = None;
            if current_tick >= gens.tick_line + self.resolution {
                gens.before_tick = std::mem::take(&mut gens.after_tick);
                gens.tick_line = current_tick;
                advanced = Some((current_tick, gens.before_tick.len()));
            }

            if observed_at < gens.tick_line - self.resolution {
                (Admission::Stale, advanced)
            } else {
                if observed_at < gens.tick_line {
                    gens.before_tick.push(sample);
                } else {
                    gens.after_tick.push(sample);
                }
                (Admission::Accepted, advanced)
            }
        };

        match admission {
            Admission::Stale => {
                self.rejected_stale.fetch_add(1, Ordering::Relaxed);
                trace!("Dropped stale sample observed at {}", observed_at);
            }
            Admission::Accepted => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some((tick_line, carried)) = advanced {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Tick line advanced to {}, carried {} samples", tick_line, carried);
        }

        admission
    }

    /// Snapshot of the samples still relevant at the current clock time.
    ///
    /// Samples come back in partition order (before-tick first). When every
    /// stored sample has gone stale the most recently inserted one is
    /// returned on its own so callers always have something to price.
    pub fn get(&self) -> Vec<Sample> {
        let mut samples = {
            let gens = self.generations.read();
            let mut all = Vec::with_capacity(gens.before_tick.len() + gens.after_tick.len());
            all.extend_from_slice(&gens.before_tick);
            all.extend_from_slice(&gens.after_tick);
            all
        };

        if samples.is_empty() {
            return samples;
        }

        let start_line = self.clock.now() - self.resolution;
        match samples.iter().position(|s| s.observed_at >= start_line) {
            Some(start) => {
                samples.drain(..start);
                samples
            }
            None => samples.split_off(samples.len() - 1),
        }
    }

    pub fn resolution(&self) -> TimeDelta {
        self.resolution
    }

    pub fn tick_line(&self) -> DateTime<Utc> {
        self.generations.read().tick_line
    }

    /// Number of retained samples, stale or not
    pub fn len(&self) -> usize {
        let gens = self.generations.read();
        gens.before_tick.len() + gens.after_tick.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            retained: self.len(),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_stale: self.rejected_stale.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

fn to_time_delta(resolution: Duration) -> CoreResult<TimeDelta> {
    if resolution.is_zero() {
        return Err(CoreError::InvalidResolution("resolution must be positive".into()));
    }

    let delta = TimeDelta::from_std(resolution)
        .map_err(|e| CoreError::InvalidResolution(format!("{resolution:?}: {e}")))?;

    // truncation works in nanoseconds
    if delta.num_nanoseconds().is_none() {
        return Err(CoreError::InvalidResolution(format!("{resolution:?} is too large")));
    }
    Ok(delta)
}

/// Statistics about the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub retained: usize,
    pub accepted: u64,
    pub rejected_stale: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use index_core::{ManualClock, Ticker};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn unix_sec(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn sample(price: i64, at: i64) -> Sample {
        Sample::new(Ticker::BTC_USD, unix_sec(at), Decimal::from(price))
    }

    fn store_at(start: i64) -> (WindowedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(unix_sec(start)));
        let store = WindowedStore::with_clock(Duration::from_secs(60), clock.clone()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_rejects_zero_resolution() {
        assert!(matches!(
            WindowedStore::new(Duration::ZERO),
            Err(CoreError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_initial_tick_line_is_truncated() {
        let (store, _) = store_at(70);
        assert_eq!(store.tick_line(), unix_sec(60));
        assert_eq!(store.resolution(), TimeDelta::minutes(1));
    }

    #[test]
    fn test_add_then_get() {
        struct Case {
            name: &'static str,
            start: i64,
            check_after: i64,
            prices: Vec<Sample>,
            expected: Vec<Sample>,
        }

        let cases = vec![
            Case {
                name: "price added within time frame",
                start: 0,
                check_after: 10,
                prices: vec![sample(199, 1)],
                expected: vec![sample(199, 1)],
            },
            Case {
                name: "no prices added",
                start: 0,
                check_after: 10,
                prices: vec![],
                expected: vec![],
            },
            Case {
                name: "price added before time frame",
                start: 120,
                check_after: 1,
                prices: vec![sample(199, 10)],
                expected: vec![],
            },
            Case {
                name: "only price became outdated and is still returned",
                start: 0,
                check_after: 71,
                prices: vec![sample(199, 10)],
                expected: vec![sample(199, 10)],
            },
            Case {
                name: "outdated price skipped when a relevant one exists",
                start: 0,
                check_after: 71,
                prices: vec![sample(199, 10), sample(199, 72)],
                expected: vec![sample(199, 72)],
            },
            Case {
                name: "first price expired, other two are not",
                start: 0,
                check_after: 62,
                prices: vec![sample(199, 1), sample(200, 2), sample(201, 62)],
                expected: vec![sample(200, 2), sample(201, 62)],
            },
        ];

        for case in cases {
            let (store, clock) = store_at(case.start);
            for price in case.prices {
                store.add(price);
            }

            clock.set(unix_sec(case.start + case.check_after));
            assert_eq!(store.get(), case.expected, "{}", case.name);
        }
    }

    #[test]
    fn test_stale_sample_is_dropped_on_arrival() {
        let (store, _) = store_at(125);

        assert_eq!(store.add(sample(1, 59)), Admission::Stale);
        assert_eq!(store.add(sample(2, 60)), Admission::Accepted);
        assert_eq!(store.len(), 1);

        let stats = store.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected_stale, 1);
    }

    #[test]
    fn test_partitions_split_on_tick_line() {
        let (store, _) = store_at(70);

        store.add(sample(1, 30));
        store.add(sample(2, 65));
        store.add(sample(3, 59));

        let gens = store.generations.read();
        assert_eq!(gens.before_tick, vec![sample(1, 30), sample(3, 59)]);
        assert_eq!(gens.after_tick, vec![sample(2, 65)]);
    }

    #[test]
    fn test_tick_advance_swaps_generations() {
        let (store, clock) = store_at(60);

        store.add(sample(1, 30));
        store.add(sample(2, 61));
        store.add(sample(3, 90));

        let prior_after = store.generations.read().after_tick.clone();
        assert_eq!(prior_after, vec![sample(2, 61), sample(3, 90)]);

        // still inside the bucket after the tick line
        clock.set(unix_sec(119));
        store.add(sample(4, 100));
        assert_eq!(store.tick_line(), unix_sec(60));

        let prior_after = store.generations.read().after_tick.clone();
        assert_eq!(prior_after, vec![sample(2, 61), sample(3, 90), sample(4, 100)]);

        // the advance happens first, then the new sample lands after the new line
        clock.set(unix_sec(130));
        store.add(sample(5, 125));

        let gens = store.generations.read();
        assert_eq!(gens.before_tick, prior_after);
        assert_eq!(gens.after_tick, vec![sample(5, 125)]);
        assert_eq!(gens.tick_line, unix_sec(120));
        drop(gens);

        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_tick_line_jumps_over_idle_buckets() {
        let (store, clock) = store_at(0);
        store.add(sample(1, 10));

        clock.set(unix_sec(600));
        store.add(sample(2, 590));

        assert_eq!(store.tick_line(), unix_sec(600));
        // the carried generation is the prior after_tick; 590 falls before the new line
        assert_eq!(
            store.generations.read().before_tick,
            vec![sample(1, 10), sample(2, 590)]
        );
        // the reader still filters by the wall clock
        assert_eq!(store.get(), vec![sample(2, 590)]);
    }

    #[test]
    fn test_sample_judged_against_advanced_tick_line() {
        let (store, clock) = store_at(70);
        assert_eq!(store.tick_line(), unix_sec(60));

        // idle for several buckets; 100 passed the old cutoff but not the new one
        clock.set(unix_sec(600));
        assert_eq!(store.add(sample(1, 100)), Admission::Stale);

        assert_eq!(store.tick_line(), unix_sec(600));
        assert!(store.is_empty());
        assert!(store.get().is_empty());

        assert_eq!(store.add(sample(2, 540)), Admission::Accepted);
        assert_eq!(store.get(), vec![sample(2, 540)]);

        let stats = store.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.rejected_stale, 1);
    }

    #[test]
    fn test_tick_line_ignores_sample_content() {
        let (store, _) = store_at(60);
        store.add(sample(1, 10_000));
        assert_eq!(store.tick_line(), unix_sec(60));
    }

    #[test]
    fn test_tick_line_never_moves_backwards() {
        let (store, clock) = store_at(300);
        clock.set(unix_sec(0));
        store.add(sample(1, 290));
        assert_eq!(store.tick_line(), unix_sec(300));
    }

    #[test]
    fn test_get_fallback_returns_last_inserted() {
        let (store, clock) = store_at(0);
        store.add(sample(1, 5));
        store.add(sample(2, 1));

        clock.set(unix_sec(100));
        assert_eq!(store.get(), vec![sample(2, 1)]);
    }

    #[test]
    fn test_concurrent_adds() {
        use std::thread;

        let (store, _) = store_at(1_000);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..100 {
                        // every fifth sample predates the window
                        let at = if j % 5 == 0 { 100 } else { 960 + j % 40 };
                        store.add(sample(i * 100 + j, at));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.accepted, 320);
        assert_eq!(stats.rejected_stale, 80);

        let mut prices: Vec<_> = store.get().into_iter().map(|s| s.price).collect();
        prices.sort();
        let mut expected: Vec<_> = (0..4)
            .flat_map(|i| (0..100).filter(|j| j % 5 != 0).map(move |j| Decimal::from(i * 100 + j)))
            .collect();
        expected.sort();
        assert_eq!(prices, expected);
    }

    proptest! {
        #[test]
        fn prop_sample_older_than_window_never_returned(
            now in 0i64..100_000,
            resolution in 1u64..600,
            offsets in proptest::collection::vec(0i64..2_000, 1..20),
        ) {
            let clock = Arc::new(ManualClock::new(unix_sec(now)));
            let store = WindowedStore::with_clock(Duration::from_secs(resolution), clock.clone()).unwrap();
            let cutoff = truncate(unix_sec(now), store.resolution()) - store.resolution();

            let mut fresh = 0;
            for (i, offset) in offsets.iter().enumerate() {
                let at = unix_sec(now + 600 - offset);
                if at >= cutoff {
                    fresh += 1;
                }
                store.add(Sample::new(Ticker::BTC_USD, at, Decimal::from(i as i64)));
            }

            prop_assert_eq!(store.len(), fresh);
            for s in store.get() {
                prop_assert!(s.observed_at >= cutoff);
            }
        }

        #[test]
        fn prop_sample_older_than_window_after_clock_jump_never_returned(
            start in 0i64..100_000,
            jump in 0i64..10_000,
            offsets in proptest::collection::vec(0i64..2_000, 1..20),
        ) {
            let (store, clock) = store_at(start);
            clock.set(unix_sec(start + jump));
            let cutoff = truncate(unix_sec(start + jump), store.resolution()) - store.resolution();

            for (i, offset) in offsets.iter().enumerate() {
                let at = unix_sec(start + jump + 600 - offset);
                let admission = store.add(Sample::new(Ticker::BTC_USD, at, Decimal::from(i as i64)));
                prop_assert_eq!(admission == Admission::Accepted, at >= cutoff);
            }

            for s in store.get() {
                prop_assert!(s.observed_at >= cutoff);
            }
        }

        #[test]
        fn prop_concurrent_adds_lose_nothing(count in 1usize..64, threads in 1usize..6) {
            use std::thread;

            let (store, _) = store_at(1_000);
            let store = Arc::new(store);

            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for j in 0..count {
                            store.add(sample((t * count + j) as i64, 990));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let mut prices: Vec<_> = store.get().into_iter().map(|s| s.price).collect();
            prices.sort();
            let expected: Vec<_> = (0..threads * count).map(|p| Decimal::from(p as i64)).collect();
            prop_assert_eq!(prices, expected);
        }
    }
}

//! Sharded counter backing the hot FTP-operation counters in
//! [`crate::metrics::FtpMetrics`].
//!
//! Every concurrent FTP connection is driven by the protocol crate's own
//! (possibly multi-threaded) tokio runtime, so a `retr`/`list`/`cwd`/`lookup`
//! counter shared across connections sees increments landing from several
//! worker threads at once. A single `AtomicU64` serializes all of them on
//! one cache line; sharding the counter and picking a shard per increment
//! spreads that contention out.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of shards for statistics counters.
/// Using 64 shards provides good concurrency reduction while keeping memory overhead low.
/// Each shard is one `AtomicU64`, so 64 shards is 512 bytes per counter.
const STATS_SHARDS: usize = 64;

/// A counter split across `STATS_SHARDS` atomics, summed only when read.
/// Each increment picks a shard via a thread-local round-robin index
/// rather than a hash of the thread id, so the choice is cheap and still
/// spreads writes evenly after a few increments.
#[derive(Debug)]
pub struct ShardedCounter {
    shards: Vec<AtomicU64>,
}

impl ShardedCounter {
    /// Create a new sharded counter with all shards initialized to 0.
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(STATS_SHARDS);
        for _ in 0..STATS_SHARDS {
            shards.push(AtomicU64::new(0));
        }
        Self { shards }
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    /// Add `delta` to one shard, chosen by a thread-local round-robin index.
    #[inline]
    pub fn add(&self, delta: u64) {
        thread_local! {
            static COUNTER: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
        }

        let shard_idx = COUNTER.with(|c| {
            let val = c.get();
            c.set(val.wrapping_add(1));
            (val as usize) % STATS_SHARDS
        });

        self.shards[shard_idx].fetch_add(delta, Ordering::Relaxed);
    }

    /// Sum all shards to get the total count.
    pub fn sum(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for ShardedCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_add() {
        let counter = ShardedCounter::new();

        counter.increment();
        counter.increment();
        counter.add(5);

        assert_eq!(counter.sum(), 7);
    }

    #[test]
    fn concurrent_increments_all_land() {
        use std::sync::Arc;
        use std::thread;

        let counter = Arc::new(ShardedCounter::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    counter.increment();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.sum(), 10_000);
    }

    #[test]
    fn default_counter_starts_at_zero() {
        let counter: ShardedCounter = Default::default();
        assert_eq!(counter.sum(), 0);

        counter.increment();
        assert_eq!(counter.sum(), 1);
    }
}

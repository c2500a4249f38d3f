use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

use crate::sharded_counter::ShardedCounter;

/// Generates a method that increments a counter field and emits a
/// trace log naming the FTP command it counts.
macro_rules! record_op {
    ($method:ident, $field:ident, $op_name:expr) => {
        pub fn $method(&self) {
            self.$field.increment();
            trace!(ftp_op = $op_name);
        }
    };
    ($method:ident, $field:ident) => {
        pub fn $method(&self) {
            self.$field.increment();
        }
    };
}

/// Implementors track a count of operations and their total latency,
/// and get an average-latency calculation for free.
pub trait LatencyMetrics {
    fn count(&self) -> u64;
    fn total_latency_ns(&self) -> u64;

    /// Average latency in milliseconds, via an atomic snapshot-retry
    /// pair so a concurrent writer can't be observed half-updated.
    fn avg_latency_ms(&self) -> f64 {
        loop {
            let count = self.count();
            if count == 0 {
                return 0.0;
            }
            let total_ns = self.total_latency_ns();
            let new_count = self.count();
            if new_count == count {
                return (total_ns as f64 / count as f64) / 1_000_000.0;
            }
        }
    }
}

/// Metrics for the FTP adapter and VFS read path. Every field here is
/// incremented from the protocol crate's own connection tasks, which run
/// concurrently across however many worker threads the runtime has, so
/// each is a [`ShardedCounter`] rather than a lone `AtomicU64`.
#[derive(Debug, Default)]
pub struct FtpMetrics {
    pub retr_count: ShardedCounter,
    pub list_count: ShardedCounter,
    pub cwd_count: ShardedCounter,
    pub lookup_count: ShardedCounter,
    pub read_count: ShardedCounter,
    pub bytes_read: ShardedCounter,
    pub error_count: ShardedCounter,
    pub read_latency_ns: ShardedCounter,
}

impl FtpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    record_op!(record_retr, retr_count, "retr");
    record_op!(record_list, list_count, "list");
    record_op!(record_cwd, cwd_count, "cwd");
    record_op!(record_lookup, lookup_count, "lookup");
    record_op!(record_error, error_count);

    /// Record one `TorrentIO` read: bytes returned and time spent
    /// blocked waiting for piece data.
    pub fn record_read(&self, bytes: u64, latency: Duration) {
        self.read_count.increment();
        self.bytes_read.add(bytes);
        self.read_latency_ns.add(latency.as_nanos() as u64);
        trace!(
            ftp_op = "retr_read",
            bytes_read = bytes,
            latency_ns = latency.as_nanos() as u64
        );
    }

    pub fn read_throughput_mbps(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        let bytes = self.bytes_read.sum();
        (bytes as f64 / 1_048_576.0) / elapsed_secs
    }

    pub fn log_summary(&self, elapsed_secs: f64) {
        loop {
            let reads = self.read_count.sum();
            let bytes = self.bytes_read.sum();
            let errors = self.error_count.sum();
            let new_reads = self.read_count.sum();
            if new_reads == reads {
                let avg_latency = self.avg_latency_ms();
                let throughput = self.read_throughput_mbps(elapsed_secs);
                info!(
                    operation = "ftp_metrics_summary",
                    reads = reads,
                    bytes_read = bytes,
                    avg_read_latency_ms = avg_latency,
                    throughput_mbps = throughput,
                    errors = errors,
                    duration_secs = elapsed_secs,
                );
                return;
            }
        }
    }
}

impl LatencyMetrics for FtpMetrics {
    fn count(&self) -> u64 {
        self.read_count.sum()
    }

    fn total_latency_ns(&self) -> u64 {
        self.read_latency_ns.sum()
    }
}

/// Metrics for `ResumeService` save activity. `outstanding` mirrors the
/// per-process save-in-flight count from Invariant 5: it should read
/// zero at every quiescent point.
#[derive(Debug, Default)]
pub struct ResumeMetrics {
    pub save_requested: AtomicU64,
    pub save_succeeded: AtomicU64,
    pub save_failed: AtomicU64,
    pub save_all_ticks: AtomicU64,
    pub outstanding: AtomicU64,
    pub total_latency_ns: AtomicU64,
}

impl ResumeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_save_requested(&self, info_hash: &str) {
        self.save_requested.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        trace!(resume_op = "save_requested", info_hash = info_hash);
    }

    pub fn record_save_succeeded(&self, info_hash: &str, latency: Duration) {
        self.save_succeeded.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        trace!(resume_op = "save_succeeded", info_hash = info_hash);
    }

    pub fn record_save_failed(&self, info_hash: &str, error: &str) {
        self.save_failed.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        warn!(resume_op = "save_failed", info_hash = info_hash, error = error);
    }

    pub fn record_save_all_tick(&self) {
        self.save_all_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_rate(&self) -> f64 {
        loop {
            let total = self.save_requested.load(Ordering::Relaxed);
            if total == 0 {
                return 100.0;
            }
            let success = self.save_succeeded.load(Ordering::Relaxed);
            let new_total = self.save_requested.load(Ordering::Relaxed);
            if new_total == total {
                return (success as f64 / total as f64) * 100.0;
            }
        }
    }

    pub fn log_summary(&self) {
        loop {
            let total = self.save_requested.load(Ordering::Relaxed);
            let succeeded = self.save_succeeded.load(Ordering::Relaxed);
            let failed = self.save_failed.load(Ordering::Relaxed);
            let outstanding = self.outstanding.load(Ordering::Relaxed);
            let new_total = self.save_requested.load(Ordering::Relaxed);
            if new_total == total {
                let avg_latency = self.avg_latency_ms();
                let success_rate = self.success_rate();
                info!(
                    operation = "resume_metrics_summary",
                    total_saves = total,
                    succeeded = succeeded,
                    failed = failed,
                    outstanding = outstanding,
                    success_rate_pct = success_rate,
                    avg_latency_ms = avg_latency,
                );
                return;
            }
        }
    }
}

impl LatencyMetrics for ResumeMetrics {
    fn count(&self) -> u64 {
        self.save_succeeded.load(Ordering::Relaxed)
    }

    fn total_latency_ns(&self) -> u64 {
        self.total_latency_ns.load(Ordering::Relaxed)
    }
}

/// Combined metrics for the whole process.
pub struct Metrics {
    pub ftp: Arc<FtpMetrics>,
    pub resume: Arc<ResumeMetrics>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ftp: Arc::new(FtpMetrics::new()),
            resume: Arc::new(ResumeMetrics::new()),
            start_time: Instant::now(),
        }
    }

    pub fn log_full_summary(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!("=== torrent-ftpd metrics summary ===");
        self.ftp.log_summary(elapsed);
        self.resume.log_summary();
        info!("=====================================");
    }

    pub fn log_periodic(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!("--- torrent-ftpd metrics (periodic) ---");
        self.ftp.log_summary(elapsed);
        self.resume.log_summary();
        info!("----------------------------------------");
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Spawn a background task logging metrics every `interval_secs`
    /// until `stop` is set.
    pub fn spawn_periodic_logging(
        self: &Arc<Self>,
        interval_secs: u64,
        stop: Arc<std::sync::atomic::AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            use tokio::time::{interval, Duration};

            let mut ticker = interval(Duration::from_secs(interval_secs));

            loop {
                ticker.tick().await;

                if stop.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }

                metrics.log_periodic();
            }
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_metrics_read_tracking() {
        let metrics = FtpMetrics::new();

        metrics.record_read(1024, Duration::from_millis(10));
        metrics.record_read(2048, Duration::from_millis(20));

        assert_eq!(metrics.read_count.sum(), 2);
        assert_eq!(metrics.bytes_read.sum(), 3072);

        let avg_latency = metrics.avg_latency_ms();
        assert!(avg_latency > 14.0 && avg_latency < 16.0);
    }

    #[test]
    fn resume_metrics_save_lifecycle() {
        let metrics = ResumeMetrics::new();

        metrics.record_save_requested("a".repeat(40).as_str());
        metrics.record_save_succeeded("a".repeat(40).as_str(), Duration::from_millis(50));

        metrics.record_save_requested("b".repeat(40).as_str());
        metrics.record_save_failed("b".repeat(40).as_str(), "disk full");

        assert_eq!(metrics.save_requested.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.save_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.save_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.outstanding.load(Ordering::Relaxed), 0);

        let success_rate = metrics.success_rate();
        assert!((success_rate - 50.0).abs() < 0.01);
    }

    #[test]
    fn outstanding_tracks_in_flight_saves() {
        let metrics = ResumeMetrics::new();
        metrics.record_save_requested("ih1");
        metrics.record_save_requested("ih2");
        assert_eq!(metrics.outstanding.load(Ordering::Relaxed), 2);
        metrics.record_save_succeeded("ih1", Duration::from_millis(1));
        assert_eq!(metrics.outstanding.load(Ordering::Relaxed), 1);
        metrics.record_save_failed("ih2", "timeout");
        assert_eq!(metrics.outstanding.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn latency_metrics_trait_zero_ops_is_zero() {
        let metrics = FtpMetrics::new();
        assert_eq!(metrics.avg_latency_ms(), 0.0);

        metrics.record_read(1024, Duration::from_millis(10));
        metrics.record_read(1024, Duration::from_millis(30));

        let avg = metrics.avg_latency_ms();
        assert!(avg > 19.0 && avg < 21.0);
    }

    #[test]
    fn macro_generated_methods_increment_counters() {
        let metrics = FtpMetrics::new();

        metrics.record_retr();
        metrics.record_list();
        metrics.record_cwd();
        metrics.record_lookup();
        metrics.record_error();

        assert_eq!(metrics.retr_count.sum(), 1);
        assert_eq!(metrics.list_count.sum(), 1);
        assert_eq!(metrics.cwd_count.sum(), 1);
        assert_eq!(metrics.lookup_count.sum(), 1);
        assert_eq!(metrics.error_count.sum(), 1);
    }

    #[test]
    fn concurrent_avg_latency_consistency() {
        use std::thread;

        let metrics = Arc::new(FtpMetrics::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for i in 0..1000 {
                        m.record_read(1024, Duration::from_nanos(1000 + i as u64));
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let avg = m.avg_latency_ms();
                        assert!(avg >= 0.0);
                        assert!(avg < 1000.0);
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }

        assert_eq!(metrics.read_count.sum(), 4000);
    }

    #[test]
    fn concurrent_success_rate_consistency() {
        use std::thread;

        let metrics = Arc::new(ResumeMetrics::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..500 {
                        m.record_save_requested("ih");
                        m.record_save_succeeded("ih", Duration::from_millis(10));
                    }
                    for _ in 0..500 {
                        m.record_save_requested("ih");
                        m.record_save_failed("ih", "error");
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let rate = m.success_rate();
                        assert!(rate >= 0.0);
                        assert!(rate <= 100.0);
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }

        assert_eq!(metrics.save_requested.load(Ordering::Relaxed), 4000);
        assert_eq!(metrics.save_succeeded.load(Ordering::Relaxed), 2000);
        assert_eq!(metrics.outstanding.load(Ordering::Relaxed), 0);
    }
}

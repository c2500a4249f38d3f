//! Resume-data persistence: an alert-driven service that snapshots
//! every known torrent's resume blob periodically and on relevant
//! engine events, writes it crash-safely, and scans the resume
//! directory for torrents to re-add at startup.

mod scan;

pub use scan::scan_resume_dir;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::alert_driver::{AlertSubscriber, Ticker};
use crate::engine::{Alert, AlertKind, AlertMask, Engine, InfoHash};
use crate::metrics::ResumeMetrics;
use crate::task::Task;

/// Not a round number, deliberately: staggers `save_all` ticks across
/// processes sharing a disk instead of phase-locking them to the same
/// wall-clock second (mirrors the teacher's irregular interval
/// constants picked the same way).
pub const SAVE_ALL_INTERVAL: Duration = Duration::from_millis(196_000);

struct Inner {
    outstanding: HashMap<InfoHash, i64>,
    handles: HashSet<InfoHash>,
    aborted: bool,
    last_save_all: Option<Instant>,
}

/// A tiny bounded worker pool for resume I/O, so disk-bound writes
/// never block the alert-dispatch thread. Four workers is plenty:
/// writes are small (a few KB of bencoded state) and infrequent.
struct WorkerPool {
    sender: mpsc::Sender<Box<dyn FnOnce() + Send>>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl WorkerPool {
    fn new(n: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<Box<dyn FnOnce() + Send>>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let receiver = receiver.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("resume-worker-{i}"))
                    .spawn(move || loop {
                        let job = { receiver.lock().unwrap().recv() };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn resume worker"),
            );
        }
        Arc::new(Self {
            sender,
            workers: Mutex::new(workers),
        })
    }

    fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.sender.send(Box::new(job));
    }
}

/// Owns resume data management: writing, deleting, and periodic
/// flushing, driven by alerts from [`crate::alert_driver::AlertDriver`].
pub struct ResumeService {
    task: Task,
    resume_dir: PathBuf,
    engine: Arc<dyn Engine>,
    metrics: Arc<ResumeMetrics>,
    pool: Arc<WorkerPool>,
    inner: Mutex<Inner>,
    condvar: Condvar,
    self_ref: Weak<ResumeService>,
}

impl ResumeService {
    pub fn new(resume_dir: PathBuf, engine: Arc<dyn Engine>, metrics: Arc<ResumeMetrics>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            task: Task::new("resume-service"),
            resume_dir,
            engine,
            metrics,
            pool: WorkerPool::new(4),
            inner: Mutex::new(Inner {
                outstanding: HashMap::new(),
                handles: HashSet::new(),
                aborted: false,
                last_save_all: None,
            }),
            condvar: Condvar::new(),
            self_ref: weak.clone(),
        })
    }

    fn inc(&self, info_hash: &str) {
        let mut inner = self.inner.lock().unwrap();
        *inner.outstanding.entry(info_hash.to_string()).or_insert(0) += 1;
        self.metrics.record_save_requested(info_hash);
        self.condvar.notify_all();
    }

    fn dec(&self, info_hash: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(count) = inner.outstanding.get_mut(info_hash) {
            *count -= 1;
            if *count <= 0 {
                inner.outstanding.remove(info_hash);
            }
        }
        self.condvar.notify_all();
    }

    fn pop(&self, info_hash: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.outstanding.remove(info_hash);
        inner.handles.remove(info_hash);
        self.condvar.notify_all();
    }

    fn save(&self, info_hash: &str, flush: bool) {
        let known = self.inner.lock().unwrap().handles.contains(info_hash);
        if !known {
            return;
        }
        if self.engine.save_resume_data(info_hash, flush).is_ok() {
            self.inc(info_hash);
        }
    }

    fn save_all(&self, flush: bool) {
        let handles: Vec<InfoHash> = self.inner.lock().unwrap().handles.iter().cloned().collect();
        for info_hash in handles {
            self.save(&info_hash, flush);
        }
    }

    fn resume_path(&self, info_hash: &str) -> PathBuf {
        self.resume_dir.join(format!("{info_hash}.resume"))
    }

    fn write_resume_data(&self, info_hash: InfoHash, params: Vec<u8>) {
        let started = Instant::now();
        let result = write_resume_data_inner(&self.resume_dir, &self.resume_path(&info_hash), &params);
        match result {
            Ok(()) => {
                tracing::debug!(info_hash = %info_hash, "wrote resume data");
                self.metrics.record_save_succeeded(&info_hash, started.elapsed());
            }
            Err(e) => {
                tracing::error!(info_hash = %info_hash, error = %e, "writing resume data");
                self.metrics.record_save_failed(&info_hash, &e.to_string());
            }
        }
        self.dec(&info_hash);
    }

    fn delete_resume_data(&self, info_hash: InfoHash) {
        let path = self.resume_path(&info_hash);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(info_hash = %info_hash, "deleted resume data"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(info_hash = %info_hash, error = %e, "deleting resume data"),
        }
        self.pop(&info_hash);
    }

    /// Stop accepting new torrents and flush every known handle with
    /// `flush=true`. Must be called exactly once.
    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.aborted, "ResumeService.abort() called twice");
        inner.aborted = true;
        drop(inner);
        self.save_all(true);
        self.task.terminate();
    }

    fn done(&self) -> bool {
        self.inner.lock().unwrap().outstanding.is_empty()
    }

    /// Block until every outstanding save has completed. Must be
    /// called after `abort`.
    pub fn wait(&self) {
        let inner = self.inner.lock().unwrap();
        assert!(inner.aborted, "ResumeService.wait() called before abort()");
        let _guard = self
            .condvar
            .wait_while(inner, |_| !self.done())
            .unwrap();
    }
}

impl Ticker for ResumeService {
    fn get_tick_deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock().unwrap();
        if inner.aborted {
            return None;
        }
        Some(inner.last_save_all.map_or_else(Instant::now, |t| t + SAVE_ALL_INTERVAL))
    }

    fn tick(&self, now: Instant) {
        self.metrics.record_save_all_tick();
        self.save_all(false);
        self.inner.lock().unwrap().last_save_all = Some(now);
    }
}

impl AlertSubscriber for ResumeService {
    fn alert_mask(&self) -> AlertMask {
        AlertMask::of(&[
            AlertKind::AddTorrent,
            AlertKind::TorrentRemoved,
            AlertKind::SaveResumeData,
            AlertKind::SaveResumeDataFailed,
            AlertKind::FileRenamed,
            AlertKind::TorrentPaused,
            AlertKind::TorrentFinished,
            AlertKind::StorageMoved,
            AlertKind::CacheFlushed,
        ])
    }

    fn handle_alert(&self, alert: &Alert) {
        match alert {
            Alert::SaveResumeData { info_hash, params } => {
                let known = self.inner.lock().unwrap().handles.contains(info_hash);
                if !known {
                    tracing::debug!(info_hash = %info_hash, "dropping resume data for missing torrent");
                    return;
                }
                let info_hash = info_hash.clone();
                let params = params.clone();
                if let Some(this) = self.self_ref.upgrade() {
                    self.pool.submit(move || this.write_resume_data(info_hash, params));
                }
            }
            Alert::SaveResumeDataFailed { info_hash } => self.dec(info_hash),
            Alert::AddTorrent { info_hash } => {
                let mut inner = self.inner.lock().unwrap();
                if inner.aborted {
                    tracing::warn!(info_hash = %info_hash, "torrent added after ResumeService aborted");
                    return;
                }
                inner.handles.insert(info_hash.clone());
            }
            Alert::TorrentRemoved { info_hash } => {
                let info_hash = info_hash.clone();
                if let Some(this) = self.self_ref.upgrade() {
                    self.pool.submit(move || this.delete_resume_data(info_hash));
                }
            }
            Alert::FileRenamed { info_hash }
            | Alert::TorrentPaused { info_hash }
            | Alert::TorrentFinished { info_hash }
            | Alert::StorageMoved { info_hash }
            | Alert::CacheFlushed { info_hash } => self.save(info_hash, false),
            _ => {}
        }
    }
}

fn write_resume_data_inner(dir: &PathBuf, path: &PathBuf, data: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let tmp_path = path.with_extension("tmp");
    let result = (|| {
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)
    })();
    match std::fs::remove_file(&tmp_path) {
        Ok(()) | Err(_) => {}
    }
    result
}

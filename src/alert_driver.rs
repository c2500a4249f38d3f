//! Single consumer of engine alerts: one dedicated thread polls the
//! engine and multiplexes each alert to every subscriber whose mask
//! includes that alert's kind (§4.6). Also owns `Ticker` scheduling —
//! subsystems that need periodic wakeups independent of alert arrival
//! (namely `ResumeService`'s `save_all`) register a [`Ticker`] here
//! instead of running their own timer thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{Alert, AlertMask, Engine};
use crate::task::{Task, Terminable, ThreadHandle};

/// A deadline-driven wakeup independent of alert arrival. The alert
/// driver wakes (or polls with a shorter timeout) no later than the
/// earliest deadline across every registered ticker.
pub trait Ticker: Send + Sync {
    /// `None` means "not scheduled" (the Python original's `math.inf`).
    fn get_tick_deadline(&self) -> Option<Instant>;
    fn tick(&self, now: Instant);
}

/// Something that wants a subset of engine alerts delivered.
pub trait AlertSubscriber: Send + Sync {
    fn alert_mask(&self) -> AlertMask;
    fn handle_alert(&self, alert: &Alert);
}

const POLL_TIMEOUT_CAP: Duration = Duration::from_secs(5);

struct Shared {
    engine: Arc<dyn Engine>,
    subscribers: Mutex<Vec<Arc<dyn AlertSubscriber>>>,
    tickers: Mutex<Vec<Arc<dyn Ticker>>>,
    should_stop: Arc<AtomicBool>,
}

/// Owns the dispatch thread plus the subscriber/ticker registries.
pub struct AlertDriver {
    task: Task,
    shared: Arc<Shared>,
}

impl AlertDriver {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            task: Task::new("alert-driver"),
            shared: Arc::new(Shared {
                engine,
                subscribers: Mutex::new(Vec::new()),
                tickers: Mutex::new(Vec::new()),
                should_stop: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) {
        self.shared.subscribers.lock().unwrap().push(subscriber);
    }

    pub fn add_ticker(&self, ticker: Arc<dyn Ticker>) {
        self.shared.tickers.lock().unwrap().push(ticker);
    }

    /// Enabled alert mask: the union of every subscriber's mask, per
    /// §6's "must enable at minimum the union of subscriber masks".
    fn enabled_mask(&self) -> AlertMask {
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .fold(AlertMask::NONE, |acc, s| acc.union(s.alert_mask()))
    }

    /// Spawn the dispatch thread and register it as this task's only
    /// child, so `terminate`/`join` tear it down.
    pub fn start(&self) {
        let shared = self.shared.clone();
        let should_stop = shared.should_stop.clone();
        let handle = std::thread::Builder::new()
            .name("alert-driver".into())
            .spawn(move || run_loop(shared))
            .expect("failed to spawn alert-driver thread");
        self.task.add_child(Box::new(ThreadHandle::new(should_stop, handle)));
    }

    pub fn terminate(&self) {
        self.task.terminate();
    }

    pub fn join(&self) {
        self.task.join();
    }
}

fn run_loop(shared: Arc<Shared>) {
    while !shared.should_stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        let deadline = shared
            .tickers
            .lock()
            .unwrap()
            .iter()
            .filter_map(|t| t.get_tick_deadline())
            .min();
        let timeout = match deadline {
            Some(d) if d > now => (d - now).min(POLL_TIMEOUT_CAP),
            Some(_) => Duration::from_millis(0),
            None => POLL_TIMEOUT_CAP,
        };

        let alerts = shared.engine.poll_alerts(timeout);
        if !alerts.is_empty() {
            let subscribers = shared.subscribers.lock().unwrap();
            for alert in &alerts {
                for subscriber in subscribers.iter() {
                    if subscriber.alert_mask().contains(alert.kind()) {
                        subscriber.handle_alert(alert);
                    }
                }
            }
        }

        let now = Instant::now();
        for ticker in shared.tickers.lock().unwrap().iter() {
            if matches!(ticker.get_tick_deadline(), Some(d) if d <= now) {
                ticker.tick(now);
            }
        }
    }
}

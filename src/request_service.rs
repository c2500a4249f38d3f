//! Per-torrent piece-interest bookkeeping (§4.4): adds a torrent to the
//! engine on first request, tracks a multiset of interval reservations
//! per torrent, pushes per-piece priorities derived from that multiset,
//! and wakes `TorrentIO` readers when the engine reports a piece
//! complete. Shares the alert-driver/`Ticker` plumbing built for
//! `ResumeService`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::alert_driver::{AlertSubscriber, Ticker};
use crate::engine::{Alert, AlertKind, AlertMask, Engine, InfoHash, Priority, ResumeBlob};
use crate::error::{Result, TorrentFtpError};
use crate::task::Task;

/// How long a torrent with zero interest sits in `Removing` before the
/// torrent is actually dropped from the engine. Gives a reader that
/// closes one file and immediately opens another in the same torrent a
/// chance to avoid a pointless remove/re-add cycle.
pub const REMOVAL_GRACE: Duration = Duration::from_secs(30);

/// Builds the engine's `add_torrent_params` blob. Invoked exactly once
/// per torrent, the first time any reader expresses interest in it.
pub type ConfigureAtp = Box<dyn FnOnce() -> ResumeBlob + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Absent,
    Adding,
    Active,
    Removing,
}

struct Interval {
    id: u64,
    first: u32,
    last: u32,
    priority: Priority,
}

#[derive(Default)]
struct TorrentEntry {
    state: State,
    intervals: Vec<Interval>,
    active_priorities: HashMap<u32, Priority>,
    completed: HashSet<u32>,
    read_data: HashMap<u32, std::result::Result<Vec<u8>, String>>,
    removal_deadline: Option<Instant>,
    removal_issued: bool,
}

impl Default for State {
    fn default() -> Self {
        State::Absent
    }
}

struct Inner {
    torrents: HashMap<InfoHash, TorrentEntry>,
    next_id: u64,
}

/// Held by a `TorrentIO` (or any other reader) for as long as it wants
/// a piece range kept warm. Dropping it releases the interval.
pub struct RequestHandle {
    service: Arc<RequestService>,
    info_hash: InfoHash,
    id: u64,
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        self.service.release(&self.info_hash, self.id);
    }
}

pub struct RequestService {
    task: Task,
    engine: Arc<dyn Engine>,
    inner: Mutex<Inner>,
    condvar: Condvar,
    removal_grace: Duration,
    self_ref: Weak<RequestService>,
}

impl RequestService {
    pub fn new(engine: Arc<dyn Engine>) -> Arc<Self> {
        Self::with_removal_grace(engine, REMOVAL_GRACE)
    }

    pub fn with_removal_grace(engine: Arc<dyn Engine>, removal_grace: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            task: Task::new("request-service"),
            engine,
            inner: Mutex::new(Inner {
                torrents: HashMap::new(),
                next_id: 0,
            }),
            condvar: Condvar::new(),
            removal_grace,
            self_ref: weak.clone(),
        })
    }

    fn this(&self) -> Arc<RequestService> {
        self.self_ref.upgrade().expect("RequestService dropped while in use")
    }

    /// Register interest in `[first, last]` (inclusive piece indices)
    /// of `info_hash` at `priority`, adding the torrent to the engine
    /// on demand via `configure_atp` if this is the first interest.
    pub fn request(
        &self,
        info_hash: InfoHash,
        first: u32,
        last: u32,
        priority: Priority,
        configure_atp: ConfigureAtp,
    ) -> Result<RequestHandle> {
        let mut needs_add = false;
        let id;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            id = inner.next_id;
            let entry = inner.torrents.entry(info_hash.clone()).or_default();
            entry.intervals.push(Interval { id, first, last, priority });
            match entry.state {
                State::Absent => {
                    entry.state = State::Adding;
                    needs_add = true;
                }
                State::Removing => {
                    entry.state = State::Active;
                    entry.removal_deadline = None;
                    entry.removal_issued = false;
                }
                State::Adding | State::Active => {}
            }
            self.push_priorities(&mut inner, &info_hash);
        }

        if needs_add {
            let atp = configure_atp();
            if let Err(e) = self.engine.add_torrent(atp) {
                let mut inner = self.inner.lock().unwrap();
                inner.torrents.remove(&info_hash);
                self.condvar.notify_all();
                tracing::warn!(info_hash = %info_hash, error = %e, "add_torrent failed");
                return Err(e);
            }
        }

        Ok(RequestHandle {
            service: self.this(),
            info_hash,
            id,
        })
    }

    fn release(&self, info_hash: &str, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.torrents.get_mut(info_hash) else {
            return;
        };
        entry.intervals.retain(|i| i.id != id);
        if entry.intervals.is_empty() && matches!(entry.state, State::Active) {
            entry.state = State::Removing;
            entry.removal_deadline = Some(Instant::now() + self.removal_grace);
            entry.removal_issued = false;
        }
        let info_hash = info_hash.to_string();
        self.push_priorities(&mut inner, &info_hash);
        self.condvar.notify_all();
    }

    /// Recompute each piece's priority as the max across intervals
    /// covering it, and push only the pieces whose priority actually
    /// changed (including dropping to zero for pieces no longer
    /// covered by anything).
    fn push_priorities(&self, inner: &mut Inner, info_hash: &str) {
        let Some(entry) = inner.torrents.get_mut(info_hash) else {
            return;
        };
        let mut next = HashMap::new();
        for interval in &entry.intervals {
            for piece in interval.first..=interval.last {
                let slot = next.entry(piece).or_insert(0u8);
                *slot = (*slot).max(interval.priority);
            }
        }

        let mut to_push: Vec<(u32, Priority)> = Vec::new();
        for (piece, priority) in &next {
            if entry.active_priorities.get(piece) != Some(priority) {
                to_push.push((*piece, *priority));
            }
        }
        for piece in entry.active_priorities.keys() {
            if !next.contains_key(piece) {
                to_push.push((*piece, 0));
            }
        }
        entry.active_priorities = next;

        for (piece, priority) in to_push {
            if let Err(e) = self.engine.set_piece_priority(info_hash, piece, priority) {
                tracing::warn!(info_hash = %info_hash, piece, error = %e, "set_piece_priority failed");
            }
        }
    }

    /// Block until `piece_index` of `info_hash` has downloaded and its
    /// bytes have been fetched from the engine, or until `timeout`
    /// elapses.
    pub fn wait_for_piece(&self, info_hash: &str, piece_index: u32, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            let Some(entry) = inner.torrents.get_mut(info_hash) else {
                return Err(TorrentFtpError::EngineError(format!(
                    "no outstanding interest in torrent {info_hash}"
                )));
            };

            if let Some(data) = entry.read_data.remove(&piece_index) {
                return data.map_err(TorrentFtpError::EngineError);
            }

            if entry.completed.contains(&piece_index) {
                // Data not fetched yet; issue the read and wait again.
                drop(inner);
                if let Err(e) = self.engine.read_piece(info_hash, piece_index) {
                    return Err(e);
                }
                inner = self.inner.lock().unwrap();
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TorrentFtpError::EngineError(format!(
                    "timed out waiting for piece {piece_index} of {info_hash}"
                )));
            }
            let (guard, _timeout_result) = self
                .condvar
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
        }
    }

    pub fn terminate(&self) {
        self.task.terminate();
    }

    pub fn join(&self) {
        self.task.join();
    }
}

impl Ticker for RequestService {
    fn get_tick_deadline(&self) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap()
            .torrents
            .values()
            .filter(|e| matches!(e.state, State::Removing) && !e.removal_issued)
            .filter_map(|e| e.removal_deadline)
            .min()
    }

    fn tick(&self, now: Instant) {
        let due: Vec<InfoHash> = {
            let mut inner = self.inner.lock().unwrap();
            let mut due = Vec::new();
            for (info_hash, entry) in inner.torrents.iter_mut() {
                if matches!(entry.state, State::Removing)
                    && !entry.removal_issued
                    && entry.removal_deadline.is_some_and(|d| d <= now)
                {
                    entry.removal_issued = true;
                    due.push(info_hash.clone());
                }
            }
            due
        };
        for info_hash in due {
            if let Err(e) = self.engine.remove_torrent(&info_hash) {
                tracing::warn!(info_hash = %info_hash, error = %e, "remove_torrent failed");
            }
        }
    }
}

impl AlertSubscriber for RequestService {
    fn alert_mask(&self) -> AlertMask {
        AlertMask::of(&[
            AlertKind::AddTorrent,
            AlertKind::TorrentRemoved,
            AlertKind::PieceFinished,
            AlertKind::ReadPiece,
        ])
    }

    fn handle_alert(&self, alert: &Alert) {
        match alert {
            Alert::AddTorrent { info_hash } => {
                let mut inner = self.inner.lock().unwrap();
                let entry = inner.torrents.entry(info_hash.clone()).or_default();
                entry.state = State::Active;
                self.condvar.notify_all();
            }
            Alert::TorrentRemoved { info_hash } => {
                let mut inner = self.inner.lock().unwrap();
                inner.torrents.remove(info_hash);
                self.condvar.notify_all();
            }
            Alert::PieceFinished { info_hash, piece_index } => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(entry) = inner.torrents.get_mut(info_hash) {
                    entry.completed.insert(*piece_index);
                }
                self.condvar.notify_all();
            }
            Alert::ReadPiece { info_hash, piece_index, data } => {
                let mut inner = self.inner.lock().unwrap();
                if let Some(entry) = inner.torrents.get_mut(info_hash) {
                    entry.read_data.insert(*piece_index, data.clone());
                }
                self.condvar.notify_all();
            }
            _ => {}
        }
    }
}

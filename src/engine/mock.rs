//! An in-memory `Engine` double for tests: alerts are injected by the
//! test via `push_alert`/`push_alerts` rather than coming from a real
//! torrent library, and `poll_alerts` drains them FIFO.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{Alert, Engine, InfoHash, Priority, ResumeBlob};
use crate::error::Result;

#[derive(Default)]
struct State {
    alerts: VecDeque<Alert>,
    added: Vec<ResumeBlob>,
    removed: Vec<InfoHash>,
    paused: bool,
    priorities: Vec<(InfoHash, u32, Priority)>,
    piece_data: std::collections::HashMap<(InfoHash, u32), Vec<u8>>,
}

pub struct MockEngine {
    state: Mutex<State>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn push_alert(&self, alert: Alert) {
        self.state.lock().unwrap().alerts.push_back(alert);
    }

    pub fn push_alerts(&self, alerts: impl IntoIterator<Item = Alert>) {
        self.state.lock().unwrap().alerts.extend(alerts);
    }

    pub fn added_torrents(&self) -> Vec<ResumeBlob> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn removed_torrents(&self) -> Vec<InfoHash> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Pre-seed the bytes `read_piece` will hand back for `(info_hash,
    /// piece_index)`, so tests can drive `RequestService`/`TorrentIO`
    /// without a real engine.
    pub fn set_piece_data(&self, info_hash: &str, piece_index: u32, data: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .piece_data
            .insert((info_hash.to_string(), piece_index), data);
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn add_torrent(&self, atp: ResumeBlob) -> Result<()> {
        self.state.lock().unwrap().added.push(atp);
        Ok(())
    }

    fn remove_torrent(&self, info_hash: &str) -> Result<()> {
        self.state.lock().unwrap().removed.push(info_hash.to_string());
        Ok(())
    }

    fn save_resume_data(&self, _info_hash: &str, _flush: bool) -> Result<()> {
        Ok(())
    }

    fn set_piece_priority(&self, info_hash: &str, piece_index: u32, priority: Priority) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .priorities
            .push((info_hash.to_string(), piece_index, priority));
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.state.lock().unwrap().paused = true;
        Ok(())
    }

    fn read_piece(&self, info_hash: &str, piece_index: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let data = state
            .piece_data
            .get(&(info_hash.to_string(), piece_index))
            .cloned()
            .ok_or_else(|| format!("no data seeded for piece {piece_index}"));
        state.alerts.push_back(Alert::ReadPiece {
            info_hash: info_hash.to_string(),
            piece_index,
            data,
        });
        Ok(())
    }

    fn poll_alerts(&self, timeout: Duration) -> Vec<Alert> {
        let mut state = self.state.lock().unwrap();
        if state.alerts.is_empty() {
            drop(state);
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
            return Vec::new();
        }
        state.alerts.drain(..).collect()
    }
}

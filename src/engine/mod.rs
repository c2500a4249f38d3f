//! The boundary to the torrent engine itself, which is out of scope
//! for this crate (§1 Non-goals): `Engine` is the contract a real
//! engine integration must satisfy, expressed as a trait so the rest
//! of the crate (request service, resume service, alert driver) never
//! depends on a concrete torrent library.

mod mock;

pub use mock::MockEngine;

use crate::error::Result;
use std::time::Duration;

/// 40-character lowercase hex string; equality is byte-wise (string
/// equality suffices since the representation is canonical).
pub type InfoHash = String;

/// Opaque, engine-defined bencoded `add_torrent_params` blob. This
/// crate never interprets its contents; it only round-trips it
/// through resume files and hands it back to `Engine::add_torrent`.
pub type ResumeBlob = Vec<u8>;

/// Per-piece priority, engine-defined range; 0 means "do not download".
pub type Priority = u8;

/// The alert kinds the alert driver can dispatch. Used both as the
/// tag on [`Alert`] and, via [`AlertMask`], as a subscriber's filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertKind {
    AddTorrent = 0,
    TorrentRemoved = 1,
    SaveResumeData = 2,
    SaveResumeDataFailed = 3,
    FileRenamed = 4,
    TorrentPaused = 5,
    TorrentFinished = 6,
    StorageMoved = 7,
    CacheFlushed = 8,
    PieceFinished = 9,
    ReadPiece = 10,
}

/// A bitset of [`AlertKind`]s a subscriber wants delivered. The alert
/// driver enables, at minimum, the union of every subscriber's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertMask(u32);

impl AlertMask {
    pub const NONE: AlertMask = AlertMask(0);

    pub fn of(kinds: &[AlertKind]) -> Self {
        let mut mask = 0u32;
        for k in kinds {
            mask |= 1 << (*k as u32);
        }
        AlertMask(mask)
    }

    pub fn contains(&self, kind: AlertKind) -> bool {
        self.0 & (1 << (kind as u32)) != 0
    }

    pub fn union(&self, other: AlertMask) -> AlertMask {
        AlertMask(self.0 | other.0)
    }
}

/// One event the engine reports. Carries just enough to let
/// subscribers act without querying the engine further.
#[derive(Debug, Clone)]
pub enum Alert {
    AddTorrent { info_hash: InfoHash },
    TorrentRemoved { info_hash: InfoHash },
    SaveResumeData { info_hash: InfoHash, params: ResumeBlob },
    SaveResumeDataFailed { info_hash: InfoHash },
    FileRenamed { info_hash: InfoHash },
    TorrentPaused { info_hash: InfoHash },
    TorrentFinished { info_hash: InfoHash },
    StorageMoved { info_hash: InfoHash },
    CacheFlushed { info_hash: InfoHash },
    PieceFinished { info_hash: InfoHash, piece_index: u32 },
    ReadPiece { info_hash: InfoHash, piece_index: u32, data: std::result::Result<Vec<u8>, String> },
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::AddTorrent { .. } => AlertKind::AddTorrent,
            Alert::TorrentRemoved { .. } => AlertKind::TorrentRemoved,
            Alert::SaveResumeData { .. } => AlertKind::SaveResumeData,
            Alert::SaveResumeDataFailed { .. } => AlertKind::SaveResumeDataFailed,
            Alert::FileRenamed { .. } => AlertKind::FileRenamed,
            Alert::TorrentPaused { .. } => AlertKind::TorrentPaused,
            Alert::TorrentFinished { .. } => AlertKind::TorrentFinished,
            Alert::StorageMoved { .. } => AlertKind::StorageMoved,
            Alert::CacheFlushed { .. } => AlertKind::CacheFlushed,
            Alert::PieceFinished { .. } => AlertKind::PieceFinished,
            Alert::ReadPiece { .. } => AlertKind::ReadPiece,
        }
    }

    pub fn info_hash(&self) -> &str {
        match self {
            Alert::AddTorrent { info_hash }
            | Alert::TorrentRemoved { info_hash }
            | Alert::SaveResumeData { info_hash, .. }
            | Alert::SaveResumeDataFailed { info_hash }
            | Alert::FileRenamed { info_hash }
            | Alert::TorrentPaused { info_hash }
            | Alert::TorrentFinished { info_hash }
            | Alert::StorageMoved { info_hash }
            | Alert::CacheFlushed { info_hash }
            | Alert::PieceFinished { info_hash, .. }
            | Alert::ReadPiece { info_hash, .. } => info_hash,
        }
    }
}

/// The contract a torrent engine integration must satisfy. All
/// methods are thread-safe in the engine's own contract (§5 "Shared
/// resources"); this crate never needs `&mut self`.
pub trait Engine: Send + Sync {
    /// Start downloading a torrent from an opaque, previously-stored
    /// `add_torrent_params` blob (as produced by resume data, or by
    /// whatever out-of-scope mechanism first introduces a torrent).
    fn add_torrent(&self, atp: ResumeBlob) -> Result<()>;

    /// Request removal; the corresponding `TorrentRemoved` alert
    /// arrives asynchronously.
    fn remove_torrent(&self, info_hash: &str) -> Result<()>;

    /// Request a resume-data snapshot; the corresponding
    /// `SaveResumeData`/`SaveResumeDataFailed` alert arrives
    /// asynchronously. `flush` additionally flushes the disk cache
    /// (used only during shutdown, mirroring `abort`'s `flush=True`).
    fn save_resume_data(&self, info_hash: &str, flush: bool) -> Result<()>;

    /// Set the download priority of a contiguous piece range.
    fn set_piece_priority(&self, info_hash: &str, piece_index: u32, priority: Priority) -> Result<()>;

    /// Request the already-downloaded bytes of one piece; the result
    /// arrives asynchronously as a `ReadPiece` alert. Callers must only
    /// invoke this once a `PieceFinished` alert for the same piece has
    /// already been observed.
    fn read_piece(&self, info_hash: &str, piece_index: u32) -> Result<()>;

    /// Pause the whole engine (used during the lifecycle supervisor's
    /// shutdown sequence, before draining the resume service).
    fn pause(&self) -> Result<()>;

    /// Block for up to `timeout` waiting for the next batch of
    /// alerts; returns an empty vec on timeout. The alert driver is
    /// this method's only caller.
    fn poll_alerts(&self, timeout: Duration) -> Vec<Alert>;
}

//! Buffered read stream over a `[start, stop)` byte window of one
//! torrent (§4.3): translates offsets to piece indices, blocks on the
//! request service until the covering piece is available, and keeps a
//! sliding request window a few pieces ahead of the read position so
//! sequential reads rarely block on a piece that hasn't even been
//! requested yet.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{InfoHash, Priority};
use crate::request_service::{ConfigureAtp, RequestHandle, RequestService};

/// How long a single piece wait blocks before giving up. Generous: a
/// slow swarm is still progress, a wedged one should surface as an IO
/// error rather than hang an FTP connection thread forever.
const PIECE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Priority used for the current sliding request window.
const FOREGROUND_PRIORITY: Priority = 7;

/// How many pieces beyond the one currently being read stay requested
/// at all times. Re-requested once the read position gets within one
/// piece of the window's far edge.
const READAHEAD_PIECES: u32 = 2;

fn piece_index_of(piece_length: u64, offset: u64) -> u32 {
    (offset / piece_length) as u32
}

/// A seekable, read-only byte stream over `[start, stop)` of a
/// torrent. Implements `Read` (and therefore `crate::vfs::ReadStream`)
/// and releases its piece interest on drop.
pub struct TorrentIO {
    request_service: Arc<RequestService>,
    info_hash: InfoHash,
    start: u64,
    stop: u64,
    piece_length: u64,
    position: u64,
    last_piece: u32,
    handle: RequestHandle,
    window: (u32, u32),
    buffer: Option<(u32, Vec<u8>)>,
}

impl TorrentIO {
    /// `configure_atp` is consumed exactly once, only if this is the
    /// first reader of `info_hash` across the whole request service.
    pub fn new(
        request_service: Arc<RequestService>,
        info_hash: InfoHash,
        start: u64,
        stop: u64,
        piece_length: u64,
        configure_atp: ConfigureAtp,
    ) -> std::io::Result<Self> {
        assert!(piece_length > 0, "piece_length must be nonzero");
        assert!(start <= stop, "start must not exceed stop");

        let first = piece_index_of(piece_length, start);
        let last_piece = if stop == start {
            first
        } else {
            piece_index_of(piece_length, stop - 1)
        };
        let window_end = (first + READAHEAD_PIECES).min(last_piece);
        let handle = request_service
            .request(info_hash.clone(), first, window_end, FOREGROUND_PRIORITY, configure_atp)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            request_service,
            info_hash,
            start,
            stop,
            piece_length,
            position: start,
            last_piece,
            handle,
            window: (first, window_end),
            buffer: None,
        })
    }

    /// Constant-time on metadata: drops any buffer that no longer
    /// covers the new position. `whence`-relative arithmetic is the
    /// caller's responsibility; this takes an absolute offset already
    /// clamped into `[start, stop]`.
    pub fn seek(&mut self, offset: u64) {
        let offset = offset.clamp(self.start, self.stop);
        let piece = piece_index_of(self.piece_length, offset);
        if let Some((idx, _)) = &self.buffer {
            if *idx != piece {
                self.buffer = None;
            }
        }
        self.position = offset;
        self.slide_window_to(piece);
    }

    fn remaining(&self) -> u64 {
        self.stop.saturating_sub(self.position)
    }

    /// Re-request the interval `[piece, piece + READAHEAD_PIECES]`
    /// (clamped to the file's last piece) if `piece` has drifted
    /// outside, or close to the trailing edge of, the current window.
    /// A large seek backward or forward therefore cancels the stale
    /// interval by simply dropping the old handle.
    fn slide_window_to(&mut self, piece: u32) {
        let (win_start, win_end) = self.window;
        let in_window = piece >= win_start && piece <= win_end;
        let at_trailing_edge = win_end.saturating_sub(piece) < 1 && win_end < self.last_piece;
        if in_window && !at_trailing_edge {
            return;
        }
        let new_end = (piece + READAHEAD_PIECES).min(self.last_piece);
        if let Ok(handle) = self.request_service.request(
            self.info_hash.clone(),
            piece,
            new_end,
            FOREGROUND_PRIORITY,
            Box::new(|| unreachable!("torrent already added; configure_atp not needed mid-stream")),
        ) {
            self.handle = handle;
            self.window = (piece, new_end);
        }
    }

    fn fetch_piece(&self, piece_index: u32) -> std::io::Result<Vec<u8>> {
        self.request_service
            .wait_for_piece(&self.info_hash, piece_index, PIECE_WAIT_TIMEOUT)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl Read for TorrentIO {
    fn read(&mut self, dst: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining() == 0 || dst.is_empty() {
            return Ok(0);
        }

        let piece_index = piece_index_of(self.piece_length, self.position);
        self.slide_window_to(piece_index);
        if self.buffer.as_ref().map(|(idx, _)| *idx) != Some(piece_index) {
            let data = self.fetch_piece(piece_index)?;
            self.buffer = Some((piece_index, data));
        }

        let (_, data) = self.buffer.as_ref().unwrap();
        let piece_start = piece_index as u64 * self.piece_length;
        let offset_in_piece = (self.position - piece_start) as usize;
        let available_in_piece = data.len().saturating_sub(offset_in_piece);
        let available = (available_in_piece as u64).min(self.remaining()) as usize;
        let n = available.min(dst.len());

        dst[..n].copy_from_slice(&data[offset_in_piece..offset_in_piece + n]);
        self.position += n as u64;
        Ok(n)
    }
}

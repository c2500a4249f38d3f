//! `libunftp::storage::Storage` adapter over the VFS (§4.7), the
//! direct analogue of `tvaf/ftp.py`'s `_FS`: every mutating verb
//! returns a read-only-filesystem error, `list`/`metadata` translate
//! straight from `Node::readdir`/`Node::stat`, and `get` opens the
//! node and hands the resulting blocking reader to `SyncReadBridge` so
//! the connection task never blocks its own executor thread.

use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use libunftp::auth::DefaultUser;
use libunftp::storage::{Error, ErrorKind, Fileinfo, Metadata, StorageBackend};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::TorrentFtpError;
use crate::metrics::FtpMetrics;
use crate::vfs::node::{FileType, Node, ReadStream, Stat};

use super::bridge::SyncBridge;

#[derive(Debug, Clone)]
pub struct NodeMetadata(Stat);

impl Metadata for NodeMetadata {
    fn len(&self) -> u64 {
        self.0.size
    }

    fn is_dir(&self) -> bool {
        self.0.filetype == FileType::Directory
    }

    fn is_file(&self) -> bool {
        self.0.filetype == FileType::Regular
    }

    fn is_symlink(&self) -> bool {
        self.0.filetype == FileType::Symlink
    }

    fn modified(&self) -> Result<SystemTime, Error> {
        Ok(self
            .0
            .mtime
            .and_then(|secs| u64::try_from(secs).ok())
            .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap_or_else(SystemTime::now))
    }

    fn uid(&self) -> u32 {
        0
    }

    fn gid(&self) -> u32 {
        0
    }
}

fn to_ftp_error(err: TorrentFtpError) -> Error {
    match err {
        TorrentFtpError::ReadOnlyFilesystem => Error::from(ErrorKind::PermissionDenied),
        TorrentFtpError::AuthenticationFailed(_) => Error::from(ErrorKind::PermissionDenied),
        _ => Error::from(ErrorKind::PermanentFileNotAvailable),
    }
}

fn path_to_vfs(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// A per-connection storage backend. Stateless beyond the shared
/// root: every call receives an already-absolute path, so there is no
/// per-session current-directory tracking to keep (unlike the
/// teacher's FUSE filesystem, the FTP protocol crate resolves `cwd`
/// itself before calling into the backend).
pub struct VfsStorage {
    root: Node,
    bridge: Arc<SyncBridge>,
    metrics: Arc<FtpMetrics>,
}

impl std::fmt::Debug for VfsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsStorage").finish_non_exhaustive()
    }
}

impl VfsStorage {
    pub fn new(root: Node, bridge: Arc<SyncBridge>, metrics: Arc<FtpMetrics>) -> Self {
        Self { root, bridge, metrics }
    }

    /// Translate a VFS error to the protocol crate's error type, counting
    /// it against `error_count` first.
    fn ftp_error(&self, err: TorrentFtpError) -> Error {
        self.metrics.record_error();
        to_ftp_error(err)
    }
}

#[async_trait]
impl StorageBackend<DefaultUser> for VfsStorage {
    type Metadata = NodeMetadata;

    fn supported_features(&self) -> u32 {
        0
    }

    async fn metadata<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, path: P) -> Result<Self::Metadata, Error> {
        self.metrics.record_lookup();
        let root = self.root.clone();
        let path = path_to_vfs(path.as_ref());
        self.bridge
            .run(move || root.traverse(&path, true).map(|n| NodeMetadata(n.stat())))
            .await
            .map_err(|e| self.ftp_error(e))
    }

    async fn list<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>, Error> {
        self.metrics.record_list();
        let root = self.root.clone();
        let path = path_to_vfs(path.as_ref());
        self.bridge
            .run(move || {
                let dir = root.traverse(&path, true)?;
                let entries = dir.readdir()?;
                Ok(entries
                    .into_iter()
                    .map(|d| Fileinfo {
                        path: PathBuf::from(d.name),
                        metadata: NodeMetadata(d.stat),
                    })
                    .collect())
            })
            .await
            .map_err(|e| self.ftp_error(e))
    }

    async fn get<P: AsRef<Path> + Send + std::fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
        start_pos: u64,
    ) -> Result<Box<dyn AsyncRead + Send + Sync + Unpin>, Error> {
        self.metrics.record_retr();
        let root = self.root.clone();
        let vpath = path_to_vfs(path.as_ref());
        let stream = self
            .bridge
            .run(move || -> crate::error::Result<Box<dyn ReadStream>> {
                let node = root.traverse(&vpath, true)?;
                let mut reader = node.open()?;
                if start_pos > 0 {
                    let mut sink = std::io::sink();
                    std::io::copy(&mut reader.by_ref().take(start_pos), &mut sink)?;
                }
                Ok(reader)
            })
            .await
            .map_err(|e| self.ftp_error(e))?;
        Ok(Box::new(SyncReadBridge::new(stream, self.bridge.clone(), self.metrics.clone())))
    }

    async fn put<P: AsRef<Path> + Send + std::fmt::Debug, R: AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        _user: &DefaultUser,
        _input: R,
        _path: P,
        _start_pos: u64,
    ) -> Result<u64, Error> {
        Err(to_ftp_error(TorrentFtpError::ReadOnlyFilesystem))
    }

    async fn del<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, _path: P) -> Result<(), Error> {
        Err(to_ftp_error(TorrentFtpError::ReadOnlyFilesystem))
    }

    async fn mkd<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, _path: P) -> Result<(), Error> {
        Err(to_ftp_error(TorrentFtpError::ReadOnlyFilesystem))
    }

    async fn rename<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, _from: P, _to: P) -> Result<(), Error> {
        Err(to_ftp_error(TorrentFtpError::ReadOnlyFilesystem))
    }

    async fn rmd<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, _path: P) -> Result<(), Error> {
        Err(to_ftp_error(TorrentFtpError::ReadOnlyFilesystem))
    }

    async fn cwd<P: AsRef<Path> + Send + std::fmt::Debug>(&self, _user: &DefaultUser, path: P) -> Result<(), Error> {
        self.metrics.record_cwd();
        let root = self.root.clone();
        let path = path_to_vfs(path.as_ref());
        self.bridge
            .run(move || root.traverse(&path, true).and_then(|n| n.as_dir().map(|_| ())))
            .await
            .map_err(|e| self.ftp_error(e))
    }
}

/// Adapts a blocking `ReadStream` to `AsyncRead` by shipping each
/// `read` call through the bridge's worker pool: the stream itself
/// moves into the job closure and comes back with the result so the
/// next poll can reuse it, rather than holding a lock across an await.
pub struct SyncReadBridge {
    inner: Option<Box<dyn ReadStream>>,
    bridge: Arc<SyncBridge>,
    metrics: Arc<FtpMetrics>,
    pending: Option<tokio::sync::oneshot::Receiver<(Box<dyn ReadStream>, std::io::Result<Vec<u8>>, Duration)>>,
}

impl SyncReadBridge {
    pub fn new(inner: Box<dyn ReadStream>, bridge: Arc<SyncBridge>, metrics: Arc<FtpMetrics>) -> Self {
        Self {
            inner: Some(inner),
            bridge,
            metrics,
            pending: None,
        }
    }
}

impl AsyncRead for SyncReadBridge {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        loop {
            if let Some(rx) = self.pending.as_mut() {
                return match Pin::new(rx).poll(cx) {
                    Poll::Ready(Ok((stream, result, latency))) => {
                        self.inner = Some(stream);
                        self.pending = None;
                        match result {
                            Ok(data) => {
                                self.metrics.record_read(data.len() as u64, latency);
                                buf.put_slice(&data);
                                Poll::Ready(Ok(()))
                            }
                            Err(e) => {
                                self.metrics.record_error();
                                Poll::Ready(Err(e))
                            }
                        }
                    }
                    Poll::Ready(Err(_)) => Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "ftp bridge worker pool is gone",
                    ))),
                    Poll::Pending => Poll::Pending,
                };
            }

            let mut stream = match self.inner.take() {
                Some(s) => s,
                None => return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "stream already failed"))),
            };
            let want = buf.remaining();
            let rx = self.bridge.submit(move || {
                let mut tmp = vec![0u8; want];
                let started = Instant::now();
                let result = stream.read(&mut tmp).map(|n| {
                    tmp.truncate(n);
                    tmp
                });
                (stream, result, started.elapsed())
            });
            self.pending = Some(rx);
        }
    }
}

//! # torrent-ftpd
//!
//! A read-only FTP server that exposes the content of a running
//! BitTorrent engine as a virtual filesystem. Torrents are addressed
//! by info hash under `/v1/<info_hash>/<network>/{f,i}`: `i/` lists
//! files by their original torrent index (stable even when file paths
//! collide), `f/` mirrors the torrent's own directory structure as
//! symlinks into `i/`. `/browse` is a second mount point libraries can
//! populate with curated, human-navigable views over the same files.
//!
//! ## Architecture
//!
//! - [`vfs`] — the read-only node tree (`Dir`/`FileNode`/`Symlink`)
//!   every other module builds on.
//! - [`engine`] — the trait boundary to the torrent engine itself,
//!   which this crate does not implement.
//! - [`alert_driver`] — the single thread that polls the engine and
//!   fans alerts out to subscribers, and schedules [`alert_driver::Ticker`]
//!   wakeups.
//! - [`resume`] — periodic and event-driven resume-data persistence,
//!   plus the startup resume-directory scan.
//! - [`request_service`] — per-torrent piece-interest tracking that
//!   adds/removes torrents from the engine on demand.
//! - [`torrent_io`] — a sliding-window `Read` implementation over a
//!   torrent's pieces, backed by [`request_service`].
//! - [`library`] — the `/v1` and `/browse` tree, and the `Library`
//!   trait a torrent-metadata provider implements.
//! - [`ftp`] — the FTP daemon: binds [`library`]'s tree to the
//!   third-party protocol crate.
//! - [`config`] — layered configuration (defaults, file, environment,
//!   CLI).
//! - [`error`] — the unified error type shared by every layer.
//! - [`metrics`] — structured counters for the FTP and resume paths.
//! - [`task`] — the small supervision-tree primitive every long-lived
//!   subsystem embeds for its own shutdown.
//!
//! ## Engine integration
//!
//! This crate never talks to a concrete torrent engine; [`engine::Engine`]
//! is the contract a real integration satisfies, and [`run`] takes one
//! as a dependency rather than constructing it. Likewise, torrent
//! metadata is supplied through [`library::Library`] implementations
//! registered on a [`library::Libraries`] before [`run`] is called.
//!
//! ## Blocking behavior
//!
//! The FTP protocol crate drives every connection on its own async
//! runtime, but file traversal and piece waits are blocking. [`ftp`]'s
//! storage adapter ships that work to a small dedicated thread pool
//! rather than calling `block_in_place`/`block_on`, which would risk
//! deadlocking the protocol crate's own executor under load.

pub mod alert_driver;
pub mod config;
pub mod engine;
pub mod error;
pub mod ftp;
pub mod library;
pub mod metrics;
pub mod request_service;
pub mod resume;
pub mod sharded_counter;
pub mod task;
pub mod torrent_io;
pub mod vfs;

pub use config::Config;
pub use engine::Engine;
pub use error::{Result, TorrentFtpError};
pub use ftp::AuthService;
pub use library::Libraries;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::alert_driver::AlertDriver;
use crate::ftp::Ftpd;
use crate::library::{LibraryService, RequestServiceOpener};
use crate::metrics::Metrics;
use crate::request_service::RequestService;
use crate::resume::{scan_resume_dir, ResumeService};
use crate::vfs::Node;

/// Construct every subsystem, serve FTP until interrupted, then tear
/// everything down in dependency order.
///
/// `engine` and `libraries` are the two pluggable boundaries: this
/// crate supplies the VFS, the resume/request bookkeeping, and the FTP
/// adapter, but never a concrete torrent engine or metadata source.
/// Callers construct those (or a test double) and pass them in.
pub async fn run(
    config: Config,
    engine: Arc<dyn Engine>,
    libraries: Arc<Libraries>,
    auth_service: Arc<dyn AuthService>,
) -> Result<()> {
    info!(operation = "startup", "torrent-ftpd starting");
    config.validate()?;

    let metrics = Arc::new(Metrics::new());
    let resume_dir = config.engine.resume_dir();

    let alert_driver = AlertDriver::new(engine.clone());
    let resume_service = ResumeService::new(resume_dir.clone(), engine.clone(), metrics.resume.clone());
    let request_service = RequestService::new(engine.clone());

    alert_driver.subscribe(resume_service.clone());
    alert_driver.subscribe(request_service.clone());
    alert_driver.add_ticker(resume_service.clone());
    alert_driver.add_ticker(request_service.clone());
    alert_driver.start();

    // Re-add every torrent this process already knew about before the
    // FTP daemon starts serving, so early lookups don't race the scan.
    for blob in scan_resume_dir(&resume_dir) {
        if let Err(e) = engine.add_torrent(blob) {
            error!(error = %e, "failed to re-add torrent from resume data");
        }
    }

    let opener = RequestServiceOpener::new(request_service.clone(), libraries.clone());
    let library_service = LibraryService::new(opener, libraries);
    let root = Node::Dir(library_service.root.clone());

    let metrics_stop = Arc::new(AtomicBool::new(false));
    let periodic_metrics = (config.metrics.periodic_log_interval_secs > 0)
        .then(|| metrics.spawn_periodic_logging(config.metrics.periodic_log_interval_secs, metrics_stop.clone()));

    let ftpd = Ftpd::new(root, auth_service, metrics.ftp.clone());
    let bind: SocketAddr = config
        .ftp
        .bind_address
        .parse()
        .map_err(|_| TorrentFtpError::InvalidConfig(format!("invalid bind address {}", config.ftp.bind_address)))?;
    ftpd.set_config(&bind.ip().to_string(), bind.port())?;
    info!(address = %bind, "ftp daemon listening");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| TorrentFtpError::Io(e.to_string()))?;
    info!("shutdown signal received");

    ftpd.abort();
    ftpd.wait().await;

    if let Err(e) = engine.pause() {
        error!(error = %e, "pausing engine during shutdown");
    }

    resume_service.abort();
    resume_service.wait();

    request_service.terminate();
    request_service.join();

    alert_driver.terminate();
    alert_driver.join();

    metrics_stop.store(true, Ordering::Relaxed);
    if let Some(handle) = periodic_metrics {
        handle.abort();
    }

    metrics.log_full_summary();
    Ok(())
}

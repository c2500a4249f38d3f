//! The FTP daemon (§4.7): binds `VfsStorage`/`VfsAuthenticator` to the
//! third-party protocol crate and owns the bind-address
//! reconfiguration / shutdown sequence, grounded in `tvaf/ftp.py`'s
//! `FTPD` class.

mod auth;
mod bridge;
mod storage;

pub use auth::{AuthService, SinglePasswordAuth, VfsAuthenticator};
pub use bridge::SyncBridge;
pub use storage::VfsStorage;

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::error::{Result, TorrentFtpError};
use crate::metrics::FtpMetrics;
use crate::vfs::node::Node;

struct State {
    address: Option<SocketAddr>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    join: Option<tokio::task::JoinHandle<()>>,
}

/// Owns the running FTP server, if any, and the address it is bound
/// to. `set_config` is idempotent — calling it again with the same
/// address is a no-op — and tears down any previous server before
/// starting a new one, mirroring the teacher's `set_config`.
pub struct Ftpd {
    root: Node,
    auth_service: Arc<dyn AuthService>,
    bridge: Arc<SyncBridge>,
    metrics: Arc<FtpMetrics>,
    state: Mutex<State>,
}

/// Worker count for the FTP read/traversal bridge pool. A handful of
/// concurrent connections doing blocking piece waits is the expected
/// load; this is not meant to scale to thousands of simultaneous
/// transfers.
const BRIDGE_WORKERS: usize = 8;

impl Ftpd {
    pub fn new(root: Node, auth_service: Arc<dyn AuthService>, metrics: Arc<FtpMetrics>) -> Arc<Self> {
        Arc::new(Self {
            root,
            auth_service,
            bridge: SyncBridge::new(BRIDGE_WORKERS),
            metrics,
            state: Mutex::new(State {
                address: None,
                shutdown: None,
                join: None,
            }),
        })
    }

    pub fn set_config(&self, bind_address: &str, port: u16) -> Result<()> {
        let address = format!("{bind_address}:{port}")
            .to_socket_addrs()
            .map_err(|e| TorrentFtpError::InvalidConfig(e.to_string()))?
            .next()
            .ok_or_else(|| TorrentFtpError::InvalidConfig(format!("no address resolved for {bind_address}:{port}")))?;

        let mut state = self.state.lock().unwrap();
        if state.address == Some(address) {
            return Ok(());
        }
        Self::teardown(&mut state);

        let root = self.root.clone();
        let bridge = self.bridge.clone();
        let metrics = self.metrics.clone();
        let auth_service = self.auth_service.clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let join = tokio::spawn(async move {
            let server = match libunftp::Server::with_authenticator(
                Box::new(move || VfsStorage::new(root.clone(), bridge.clone(), metrics.clone())),
                Arc::new(VfsAuthenticator::new(auth_service)),
            )
            .build()
            {
                Ok(server) => server,
                Err(e) => {
                    error!(error = %e, "failed to build ftp server");
                    return;
                }
            };

            tokio::select! {
                result = server.listen(address.to_string()) => {
                    if let Err(e) = result {
                        error!(error = %e, "ftp server exited with an error");
                    }
                }
                _ = shutdown_rx => {
                    info!(%address, "ftp server shutting down");
                }
            }
        });

        state.address = Some(address);
        state.shutdown = Some(shutdown_tx);
        state.join = Some(join);
        Ok(())
    }

    /// Signal the running server (if any) to stop. Does not wait for
    /// it — call `wait` afterward to block until it has.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        Self::teardown(&mut state);
    }

    /// Block until the server task that `abort` (or a superseding
    /// `set_config`) signaled has actually finished.
    pub async fn wait(&self) {
        let join = self.state.lock().unwrap().join.take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    fn teardown(state: &mut State) {
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(());
        }
        state.join = None;
        state.address = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{Node as N, StaticDir};

    fn empty_root() -> Node {
        N::Dir(StaticDir::new())
    }

    #[tokio::test]
    async fn set_config_with_same_address_twice_is_a_no_op() {
        let ftpd = Ftpd::new(empty_root(), Arc::new(SinglePasswordAuth::new("x")), Arc::new(FtpMetrics::new()));
        ftpd.set_config("127.0.0.1", 0).unwrap();
        let first_join_is_some = ftpd.state.lock().unwrap().join.is_some();
        assert!(first_join_is_some);
        ftpd.set_config("127.0.0.1", 0).unwrap();
        ftpd.abort();
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        let ftpd = Ftpd::new(empty_root(), Arc::new(SinglePasswordAuth::new("x")), Arc::new(FtpMetrics::new()));
        assert!(ftpd.set_config("not-a-real-host-name.invalid", 1).is_err());
    }
}

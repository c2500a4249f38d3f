//! Authentication adapter (§4.7), grounded in `tvaf/ftp.py`'s
//! `_Authorizer`: login succeeds whenever the external auth service
//! accepts the username/password pair, every user's home directory is
//! `/`, and there is no notion of per-user permissions beyond
//! read-only access to the whole tree.

use std::sync::Arc;

use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};

use crate::error::TorrentFtpError;

/// The external credential check. Production code backs this with
/// whatever user database the deployment uses; tests use an
/// accept-everything or accept-nothing stub.
pub trait AuthService: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> Result<(), TorrentFtpError>;
}

/// An `AuthService` that accepts any username and the one configured
/// password — useful for single-user deployments and tests.
pub struct SinglePasswordAuth {
    password: String,
}

impl SinglePasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self { password: password.into() }
    }
}

impl AuthService for SinglePasswordAuth {
    fn authenticate(&self, username: &str, password: &str) -> Result<(), TorrentFtpError> {
        if password == self.password {
            Ok(())
        } else {
            Err(TorrentFtpError::AuthenticationFailed(username.to_string()))
        }
    }
}

pub struct VfsAuthenticator {
    auth_service: Arc<dyn AuthService>,
}

impl std::fmt::Debug for VfsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsAuthenticator").finish_non_exhaustive()
    }
}

impl VfsAuthenticator {
    pub fn new(auth_service: Arc<dyn AuthService>) -> Self {
        Self { auth_service }
    }
}

#[async_trait]
impl Authenticator<DefaultUser> for VfsAuthenticator {
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<DefaultUser, AuthenticationError> {
        let password = creds.password.as_deref().unwrap_or("");
        self.auth_service
            .authenticate(username, password)
            .map(|_| DefaultUser)
            .map_err(|e| AuthenticationError::new(e.to_string()))
    }
}

use std::fmt;
use thiserror::Error;

/// A single field-level problem found while validating a `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for torrent-ftpd.
///
/// This enum consolidates the path-error family the VFS raises, the
/// read-only/authentication errors the FTP adapter raises, opaque
/// engine failures, resume I/O failures, and configuration errors.
/// Every variant maps to both a POSIX errno (`to_errno`) and an FTP
/// reply code (`to_ftp_reply`), so the VFS core and the FTP adapter
/// can share one error type instead of each inventing their own.
#[derive(Error, Debug, Clone)]
pub enum TorrentFtpError {
    /// No such file or directory (ENOENT).
    #[error("no such file or directory")]
    NotFound,

    /// A non-final path component was not a directory (ENOTDIR).
    #[error("not a directory")]
    NotADirectory,

    /// The final component is a directory but a file was required (EISDIR).
    #[error("is a directory")]
    IsADirectory,

    /// Symlink resolution revisited a node already seen in this chain (ELOOP).
    #[error("too many levels of symbolic links")]
    SymlinkLoop,

    /// A symlink has no target, or its target cannot be resolved (EINVAL).
    #[error("invalid symbolic link")]
    InvalidSymlink,

    /// Enumeration of this directory is disallowed (EPERM), e.g. listing `v1`.
    #[error("operation not permitted")]
    EnumerationDenied,

    /// Any attempted mutation through the read-only FTP surface (EROFS).
    #[error("read-only filesystem")]
    ReadOnlyFilesystem,

    /// The auth service rejected a username/password pair.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The torrent engine reported an unrecoverable condition for a torrent.
    #[error("torrent engine error: {0}")]
    EngineError(String),

    /// A resume-data read or write failed. Never surfaced across the FTP
    /// boundary; logged and absorbed by `ResumeService`.
    #[error("resume I/O error: {0}")]
    ResumeIoError(String),

    /// A resume blob failed to decode as bencode.
    #[error("malformed resume data: {0}")]
    ResumeDecodeError(String),

    /// The requested bind address/port could not be bound (e.g. port busy).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Aggregated configuration validation failures.
    #[error("configuration invalid: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ValidationError(Vec<ValidationIssue>),

    /// Wraps an arbitrary I/O failure not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TorrentFtpError {
    /// Map to a POSIX errno, for VFS-internal callers and any
    /// errno-shaped consumer.
    pub fn to_errno(&self) -> i32 {
        match self {
            TorrentFtpError::NotFound => libc::ENOENT,
            TorrentFtpError::NotADirectory => libc::ENOTDIR,
            TorrentFtpError::IsADirectory => libc::EISDIR,
            TorrentFtpError::SymlinkLoop => libc::ELOOP,
            TorrentFtpError::InvalidSymlink => libc::EINVAL,
            TorrentFtpError::EnumerationDenied => libc::EPERM,
            TorrentFtpError::ReadOnlyFilesystem => libc::EROFS,
            TorrentFtpError::AuthenticationFailed(_) => libc::EACCES,
            TorrentFtpError::EngineError(_) => libc::EIO,
            TorrentFtpError::ResumeIoError(_) | TorrentFtpError::ResumeDecodeError(_) => libc::EIO,
            TorrentFtpError::InvalidConfig(_) | TorrentFtpError::ValidationError(_) => libc::EINVAL,
            TorrentFtpError::Io(_) => libc::EIO,
        }
    }

    /// Map to an FTP reply code, for the adapter boundary.
    pub fn to_ftp_reply(&self) -> u16 {
        match self {
            TorrentFtpError::NotFound
            | TorrentFtpError::NotADirectory
            | TorrentFtpError::IsADirectory
            | TorrentFtpError::SymlinkLoop
            | TorrentFtpError::InvalidSymlink
            | TorrentFtpError::EnumerationDenied
            | TorrentFtpError::ReadOnlyFilesystem => 550,
            TorrentFtpError::AuthenticationFailed(_) => 530,
            TorrentFtpError::EngineError(_) => 451,
            TorrentFtpError::ResumeIoError(_) | TorrentFtpError::ResumeDecodeError(_) => 451,
            TorrentFtpError::InvalidConfig(_) | TorrentFtpError::ValidationError(_) => 501,
            TorrentFtpError::Io(_) => 451,
        }
    }

    /// Whether this error should be logged once per torrent rather than
    /// on every occurrence, per the "opaque engine error, logged once"
    /// policy.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, TorrentFtpError::EngineError(_))
    }
}

impl From<std::io::Error> for TorrentFtpError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => TorrentFtpError::NotFound,
            std::io::ErrorKind::PermissionDenied => TorrentFtpError::EnumerationDenied,
            _ => TorrentFtpError::Io(err.to_string()),
        }
    }
}

impl From<serde_bencode::Error> for TorrentFtpError {
    fn from(err: serde_bencode::Error) -> Self {
        TorrentFtpError::ResumeDecodeError(err.to_string())
    }
}

impl From<toml::de::Error> for TorrentFtpError {
    fn from(err: toml::de::Error) -> Self {
        TorrentFtpError::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for TorrentFtpError {
    fn from(err: serde_json::Error) -> Self {
        TorrentFtpError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TorrentFtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_errors_map_to_expected_errno() {
        assert_eq!(TorrentFtpError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(TorrentFtpError::NotADirectory.to_errno(), libc::ENOTDIR);
        assert_eq!(TorrentFtpError::IsADirectory.to_errno(), libc::EISDIR);
        assert_eq!(TorrentFtpError::SymlinkLoop.to_errno(), libc::ELOOP);
        assert_eq!(TorrentFtpError::InvalidSymlink.to_errno(), libc::EINVAL);
        assert_eq!(TorrentFtpError::EnumerationDenied.to_errno(), libc::EPERM);
        assert_eq!(TorrentFtpError::ReadOnlyFilesystem.to_errno(), libc::EROFS);
    }

    #[test]
    fn path_errors_map_to_550() {
        assert_eq!(TorrentFtpError::NotFound.to_ftp_reply(), 550);
        assert_eq!(TorrentFtpError::ReadOnlyFilesystem.to_ftp_reply(), 550);
        assert_eq!(
            TorrentFtpError::AuthenticationFailed("bad password".into()).to_ftp_reply(),
            530
        );
    }

    #[test]
    fn validation_error_display_joins_issues() {
        let issues = vec![
            ValidationIssue {
                field: "ftp.bind_address".into(),
                message: "must be a valid socket address".into(),
            },
            ValidationIssue {
                field: "logging.level".into(),
                message: "must be one of error, warn, info, debug, trace".into(),
            },
        ];
        let err = TorrentFtpError::ValidationError(issues);
        let display = format!("{}", err);
        assert!(display.contains("ftp.bind_address: must be a valid socket address"));
        assert!(display.contains("logging.level"));
    }

    #[test]
    fn io_error_conversion_preserves_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TorrentFtpError = io_err.into();
        assert!(matches!(err, TorrentFtpError::NotFound));
    }

    #[test]
    fn engine_error_is_flagged_for_log_once_policy() {
        assert!(TorrentFtpError::EngineError("peer timeout".into()).is_engine_error());
        assert!(!TorrentFtpError::NotFound.is_engine_error());
    }
}

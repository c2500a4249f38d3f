//! Configuration management for CLI, environment variables, and config files.

use crate::error::{TorrentFtpError, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration for torrent-ftpd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ftp: FtpConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where this process keeps its on-disk state. `data_dir/resume/`
/// holds resume files; this is the one value the core spec actually
/// names outside of the FTP bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
}

/// FTP server bind options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    pub bind_address: String,
}

/// Resume-service timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    pub save_all_interval_secs: u64,
}

/// Logging output level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Periodic metrics-summary logging. A value of 0 disables the
/// background logger; `log_full_summary` still runs once at shutdown
/// regardless of this setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub periodic_log_interval_secs: u64,
}

impl EngineConfig {
    pub fn resume_dir(&self) -> PathBuf {
        self.data_dir.join("resume")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|d| d.join("torrent-ftpd"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/torrent-ftpd")),
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2121".to_string(),
        }
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            // Deliberately not a round number: staggers `save_all` ticks
            // across processes sharing a disk instead of phase-locking
            // them to the same wall-clock second.
            save_all_interval_secs: 196,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            periodic_log_interval_secs: 300,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, TorrentFtpError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }

    pub fn from_default_locations() -> Result<Self, TorrentFtpError> {
        let config_dirs = [
            dirs::config_dir().map(|d| d.join("torrent-ftpd/config.toml")),
            Some(PathBuf::from("/etc/torrent-ftpd/config.toml")),
            Some(PathBuf::from("./torrent-ftpd.toml")),
        ];

        for path in config_dirs.iter().flatten() {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading config");
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, TorrentFtpError> {
        if let Ok(val) = std::env::var("TORRENT_FTPD_DATA_DIR") {
            self.engine.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TORRENT_FTPD_BIND_ADDRESS") {
            self.ftp.bind_address = val;
        }
        if let Ok(val) = std::env::var("TORRENT_FTPD_SAVE_ALL_INTERVAL") {
            self.resume.save_all_interval_secs = val.parse().map_err(|_| {
                TorrentFtpError::InvalidConfig(
                    "TORRENT_FTPD_SAVE_ALL_INTERVAL has invalid format".into(),
                )
            })?;
        }
        if let Ok(val) = std::env::var("TORRENT_FTPD_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("TORRENT_FTPD_METRICS_INTERVAL") {
            self.metrics.periodic_log_interval_secs = val.parse().map_err(|_| {
                TorrentFtpError::InvalidConfig(
                    "TORRENT_FTPD_METRICS_INTERVAL has invalid format".into(),
                )
            })?;
        }
        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref data_dir) = cli.data_dir {
            self.engine.data_dir = data_dir.clone();
        }
        if let Some(ref bind_address) = cli.bind_address {
            self.ftp.bind_address = bind_address.clone();
        }
        if let Some(ref level) = cli.log_level {
            self.logging.level = level.clone();
        }
        self
    }

    pub fn load() -> Result<Self, TorrentFtpError> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, TorrentFtpError> {
        Ok(Self::from_default_locations()?
            .merge_from_env()?
            .merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), TorrentFtpError> {
        let mut issues = Vec::new();

        if !self.engine.data_dir.is_absolute() {
            issues.push(ValidationIssue {
                field: "engine.data_dir".to_string(),
                message: "must be an absolute path".to_string(),
            });
        }

        if self.ftp.bind_address.parse::<SocketAddr>().is_err() {
            issues.push(ValidationIssue {
                field: "ftp.bind_address".to_string(),
                message: "must be a valid socket address (host:port)".to_string(),
            });
        }

        if self.resume.save_all_interval_secs == 0 {
            issues.push(ValidationIssue {
                field: "resume.save_all_interval_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".to_string(),
                message: format!(
                    "invalid log level '{}'; valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(TorrentFtpError::ValidationError(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub data_dir: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub config_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

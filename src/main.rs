use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use torrent_ftpd::config::{CliArgs, Config};
use torrent_ftpd::engine::MockEngine;
use torrent_ftpd::ftp::SinglePasswordAuth;
use torrent_ftpd::library::Libraries;

#[derive(Parser)]
#[command(name = "torrent-ftpd")]
#[command(about = "A read-only FTP filesystem over a running BitTorrent engine")]
struct Cli {
    #[arg(long, env = "TORRENT_FTPD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "TORRENT_FTPD_BIND_ADDRESS")]
    bind_address: Option<String>,

    #[arg(long, env = "TORRENT_FTPD_CONFIG")]
    config_file: Option<PathBuf>,

    #[arg(long, env = "TORRENT_FTPD_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "TORRENT_FTPD_FTP_PASSWORD", default_value = "torrent")]
    ftp_password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cli_args = CliArgs {
        data_dir: cli.data_dir.clone(),
        bind_address: cli.bind_address.clone(),
        config_file: cli.config_file.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = match &cli_args.config_file {
        Some(path) => Config::from_file(path)?.merge_from_env()?.merge_from_cli(&cli_args),
        None => Config::load_with_cli(&cli_args)?,
    };
    config.validate()?;

    let level = match config.logging.level.as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // No concrete torrent engine ships with this binary; MockEngine
    // stands in so it runs out of the box. Point at a real Engine
    // implementation for production use.
    let engine = Arc::new(MockEngine::new());
    let libraries = Libraries::new();
    let auth_service = Arc::new(SinglePasswordAuth::new(cli.ftp_password));

    torrent_ftpd::run(config, engine, libraries, auth_service).await?;
    Ok(())
}

//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Cookies configuration check for the extractor
//! - Startup summary of the effective configuration

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;

use crate::core::config;
use crate::core::tools::Tools;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs whether a cookies file is configured for the extractor and whether it exists.
pub fn log_cookies_configuration() {
    match config::YTDL_COOKIES_FILE.as_deref() {
        Some(path) if Path::new(path).exists() => {
            log::info!("✅ YTDL_COOKIES_FILE: {}", path);
        }
        Some(path) => {
            log::error!("❌ YTDL_COOKIES_FILE: {} (FILE NOT FOUND!)", path);
            log::error!("   Current directory: {:?}", std::env::current_dir());
            log::error!("   Age-restricted or bot-checked videos will fail to probe");
        }
        None => {
            log::warn!("⚠️  YTDL_COOKIES_FILE: not set, extractor runs anonymously");
        }
    }
}

/// Logs the effective configuration once the tools are located.
pub fn log_startup_summary(tools: &Tools) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("💿 cdmix configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("  data dir:        {}", config::DATA_DIR.display());
    log::info!("  CD capacity:     {}s", *config::playlist::CAPACITY_SECONDS);
    log::info!("  session idle:    {}s", *config::session::IDLE_TTL_SECS);
    log::info!("  token TTL:       {}s", *config::tokens::TTL_SECS);
    log::info!("  yt-dlp:          {} ({})", tools.ytdlp.command.display(), tools.ytdlp.version);
    log::info!("  ffmpeg:          {} ({})", tools.ffmpeg.command.display(), tools.ffmpeg.version);
    match &tools.zip {
        Some(zip) => log::info!("  zip:             {}", zip.command.display()),
        None => log::info!("  zip:             unavailable (export disabled)"),
    }
    match config::YTDL_PLAYER_CLIENT.as_deref() {
        Some(client) => log::info!("  player client:   {} (pinned)", client),
        None => log::info!("  player clients:  {}", config::clients::SMART_CLIENTS.join(", ")),
    }
    log_cookies_configuration();
}

use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Address the HTTP server binds to.
/// Read from HOST environment variable
/// Default: 0.0.0.0
pub static HOST: Lazy<String> = Lazy::new(|| non_empty_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()));

/// Port the HTTP server listens on.
/// Read from PORT environment variable
/// Default: 8080
pub static PORT: Lazy<u16> = Lazy::new(|| parsed_var("PORT").unwrap_or(8080));

/// Root directory for every per-session directory tree.
/// Read from DATA_DIR environment variable, supports tilde (~) expansion
/// Default: ~/cdmix-data
pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let raw = non_empty_var("DATA_DIR").unwrap_or_else(|| "~/cdmix-data".to_string());
    PathBuf::from(shellexpand::tilde(&raw).to_string())
});

/// Optional directory with the static front end, served at `/` when present.
/// Read from STATIC_DIR environment variable
pub static STATIC_DIR: Lazy<Option<PathBuf>> = Lazy::new(|| non_empty_var("STATIC_DIR").map(PathBuf::from));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: cdmix.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| non_empty_var("LOG_FILE_PATH").unwrap_or_else(|| "cdmix.log".to_string()));

/// Explicit yt-dlp binary override (YTDL_BIN). When unset the tool locator
/// tries the usual names and paths.
pub static YTDL_BIN: Lazy<Option<String>> = Lazy::new(|| non_empty_var("YTDL_BIN"));

/// Explicit ffmpeg binary override (FFMPEG_BIN).
pub static FFMPEG_BIN: Lazy<Option<String>> = Lazy::new(|| non_empty_var("FFMPEG_BIN"));

/// Explicit zip binary override (ZIP_BIN).
pub static ZIP_BIN: Lazy<Option<String>> = Lazy::new(|| non_empty_var("ZIP_BIN"));

/// Path to a Netscape cookies file handed to yt-dlp
/// Read from YTDL_COOKIES_FILE environment variable
pub static YTDL_COOKIES_FILE: Lazy<Option<String>> =
    Lazy::new(|| non_empty_var("YTDL_COOKIES_FILE").map(|raw| shellexpand::tilde(&raw).to_string()));

/// Operator-pinned player client. When set, smart probing skips the
/// client race and uses only this identity.
/// Read from YTDL_PLAYER_CLIENT environment variable
pub static YTDL_PLAYER_CLIENT: Lazy<Option<String>> = Lazy::new(|| non_empty_var("YTDL_PLAYER_CLIENT"));

/// Whether session cookies carry the `Secure` attribute.
/// Read from COOKIE_SECURE environment variable
/// Default: false
pub static COOKIE_SECURE: Lazy<bool> = Lazy::new(|| parsed_var("COOKIE_SECURE").unwrap_or(false));

/// Session lifecycle configuration
pub mod session {
    use super::{parsed_var, Duration, Lazy};

    /// Cookie carrying the session identifier
    pub const COOKIE_NAME: &str = "cdmix_sid";

    /// Request/response header echoing the session identifier for clients
    /// that cannot keep cookies
    pub const HEADER_NAME: &str = "x-session-id";

    /// Idle time after which a session and its files are destroyed
    /// Read from SESSION_IDLE_TTL_SECS environment variable
    /// Default: 6 hours
    pub static IDLE_TTL_SECS: Lazy<u64> = Lazy::new(|| parsed_var("SESSION_IDLE_TTL_SECS").unwrap_or(6 * 60 * 60));

    /// Upper bound for the sweep interval (10 minutes)
    pub const MAX_SWEEP_INTERVAL_SECS: u64 = 600;

    pub fn idle_ttl() -> Duration {
        Duration::from_secs(*IDLE_TTL_SECS)
    }
}

/// Playlist configuration
pub mod playlist {
    use super::{parsed_var, Lazy};

    /// Capacity of one CD in seconds
    /// Read from CD_CAPACITY_SECONDS environment variable
    /// Default: 4800 (80 minutes)
    pub static CAPACITY_SECONDS: Lazy<u64> = Lazy::new(|| parsed_var("CD_CAPACITY_SECONDS").unwrap_or(4800));
}

/// Add-progress and cancellation table configuration
pub mod progress {
    use super::Duration;

    /// Lifetime of a progress entry while its job is running (2 hours)
    pub const ACTIVE_TTL_SECS: u64 = 2 * 60 * 60;

    /// Lifetime of a progress entry after its job finished; long enough for one final poll
    pub const DONE_TTL_SECS: u64 = 60;

    /// Lifetime of a cancel mark (10 minutes)
    pub const CANCEL_TTL_SECS: u64 = 10 * 60;

    pub fn active_ttl() -> Duration {
        Duration::from_secs(ACTIVE_TTL_SECS)
    }

    pub fn done_ttl() -> Duration {
        Duration::from_secs(DONE_TTL_SECS)
    }

    pub fn cancel_ttl() -> Duration {
        Duration::from_secs(CANCEL_TTL_SECS)
    }
}

/// Download token configuration
pub mod tokens {
    use super::{parsed_var, Duration, Lazy};

    /// Token lifetime from issuance
    /// Read from DOWNLOAD_TOKEN_TTL_SECS environment variable
    /// Default: 15 minutes
    pub static TTL_SECS: Lazy<u64> = Lazy::new(|| parsed_var("DOWNLOAD_TOKEN_TTL_SECS").unwrap_or(15 * 60));

    /// Grace period granted on every successful redemption (2 minutes)
    pub const REDEEM_EXTENSION_SECS: u64 = 120;

    pub fn ttl() -> Duration {
        Duration::from_secs(*TTL_SECS)
    }

    pub fn redeem_extension() -> Duration {
        Duration::from_secs(REDEEM_EXTENSION_SECS)
    }
}

/// Download and transcode configuration
pub mod download {
    use super::Duration;

    /// Timeout for an extract-and-encode run (10 minutes)
    pub const EXTRACT_TIMEOUT_SECS: u64 = 600;

    /// Timeout for a metadata probe (90 seconds)
    pub const PROBE_TIMEOUT_SECS: u64 = 90;

    /// Timeout for ffmpeg transcodes and zip bundling (10 minutes)
    pub const TRANSCODE_TIMEOUT_SECS: u64 = 600;

    /// Timeout for tool version checks at startup
    pub const VERSION_CHECK_TIMEOUT_SECS: u64 = 15;

    /// MP3 bitrate used for playlist tracks and one-off conversions
    pub const MP3_BITRATE: &str = "192k";

    /// Sample rate required for an audio-only format to count as CD quality
    pub const MIN_SAMPLE_RATE: u32 = 44_100;

    pub fn extract_timeout() -> Duration {
        Duration::from_secs(EXTRACT_TIMEOUT_SECS)
    }

    pub fn probe_timeout() -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS)
    }

    pub fn transcode_timeout() -> Duration {
        Duration::from_secs(TRANSCODE_TIMEOUT_SECS)
    }

    pub fn version_check_timeout() -> Duration {
        Duration::from_secs(VERSION_CHECK_TIMEOUT_SECS)
    }
}

/// Player client identities handed to yt-dlp
pub mod clients {
    /// Identity used by fast probes and by default for downloads
    pub const FAST_CLIENT: &str = "android_vr";

    /// Smart-probe race order, most reliable first
    pub const SMART_CLIENTS: &[&str] = &["android_vr", "web_safari", "ios", "tv"];
}

/// Validation configuration
pub mod validation {
    /// Maximum URL length
    pub const MAX_URL_LENGTH: usize = 2048;
}

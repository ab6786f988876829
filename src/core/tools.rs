//! Startup discovery of the external tools the service drives.
//!
//! Each tool is tried across several candidate invocations (env override,
//! bare name on PATH, well-known install paths, module invocation). The first
//! candidate whose version flag exits zero wins.

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, ToolCommand};

/// Located tool with the version string it reported.
#[derive(Debug, Clone)]
pub struct LocatedTool {
    pub command: ToolCommand,
    pub version: String,
}

/// The set of tools available to the service.
#[derive(Debug, Clone)]
pub struct Tools {
    /// Metadata extractor / downloader (yt-dlp)
    pub ytdlp: LocatedTool,
    /// Encoder (ffmpeg)
    pub ffmpeg: LocatedTool,
    /// Archiver (zip); playlist export is disabled without it
    pub zip: Option<LocatedTool>,
}

/// What to look for and how to ask it for a version.
struct ToolSpec {
    label: &'static str,
    override_bin: Option<String>,
    names: &'static [&'static str],
    module_fallback: Option<(&'static str, &'static [&'static str])>,
    version_args: &'static [&'static str],
}

const YTDLP_NAMES: &[&str] = &["yt-dlp", "/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp", "~/.local/bin/yt-dlp"];
const FFMPEG_NAMES: &[&str] = &[
    "ffmpeg",
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
];
const ZIP_NAMES: &[&str] = &["zip", "/usr/bin/zip", "/usr/local/bin/zip"];
const YTDLP_MODULE_ARGS: &[&str] = &["-m", "yt_dlp"];

/// Builds the ordered candidate list: override first, then names, then the
/// module invocation if any.
fn candidate_list(
    override_bin: Option<&str>,
    names: &[&str],
    module_fallback: Option<(&str, &[&str])>,
) -> Vec<ToolCommand> {
    let mut candidates = Vec::new();
    if let Some(bin) = override_bin {
        candidates.push(ToolCommand::new(bin));
    }
    for name in names {
        let expanded = shellexpand::tilde(name).to_string();
        let candidate = ToolCommand::new(expanded);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    if let Some((program, prefix)) = module_fallback {
        candidates.push(ToolCommand::with_prefix(program, prefix));
    }
    candidates
}

/// Tries candidates in order and returns the first that answers its version flag.
pub async fn locate(candidates: &[ToolCommand], version_args: &[&str]) -> Option<LocatedTool> {
    for candidate in candidates {
        match run_with_timeout(candidate, version_args, config::download::version_check_timeout()).await {
            Ok(output) if output.success() => {
                let version = output
                    .stdout
                    .lines()
                    .chain(output.stderr.lines())
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .unwrap_or("unknown")
                    .to_string();
                return Some(LocatedTool {
                    command: candidate.clone(),
                    version,
                });
            }
            Ok(output) => {
                log::debug!(
                    "Candidate '{}' answered with exit code {:?}",
                    candidate.display(),
                    output.exit_code
                );
            }
            Err(e) => {
                log::debug!("Candidate '{}' unavailable: {}", candidate.display(), e);
            }
        }
    }
    None
}

async fn locate_spec(spec: &ToolSpec) -> Option<LocatedTool> {
    let candidates = candidate_list(spec.override_bin.as_deref(), spec.names, spec.module_fallback);
    let located = locate(&candidates, spec.version_args).await;
    match &located {
        Some(tool) => log::info!("✅ {}: {} ({})", spec.label, tool.command.display(), tool.version),
        None => log::warn!(
            "❌ {}: not found (tried {})",
            spec.label,
            candidates.iter().map(ToolCommand::display).collect::<Vec<_>>().join(", ")
        ),
    }
    located
}

/// Locates yt-dlp, ffmpeg and zip. Missing yt-dlp or ffmpeg is fatal.
pub async fn locate_tools() -> Result<Tools, AppError> {
    let ytdlp_spec = ToolSpec {
        label: "yt-dlp",
        override_bin: config::YTDL_BIN.clone(),
        names: YTDLP_NAMES,
        module_fallback: Some(("python3", YTDLP_MODULE_ARGS)),
        version_args: &["--version"],
    };
    let ffmpeg_spec = ToolSpec {
        label: "ffmpeg",
        override_bin: config::FFMPEG_BIN.clone(),
        names: FFMPEG_NAMES,
        module_fallback: None,
        version_args: &["-version"],
    };
    let zip_spec = ToolSpec {
        label: "zip",
        override_bin: config::ZIP_BIN.clone(),
        names: ZIP_NAMES,
        module_fallback: None,
        version_args: &["-v"],
    };

    let (ytdlp, ffmpeg, zip) = tokio::join!(
        locate_spec(&ytdlp_spec),
        locate_spec(&ffmpeg_spec),
        locate_spec(&zip_spec)
    );

    let ytdlp = ytdlp.ok_or_else(|| AppError::ToolUnavailable("yt-dlp not found; set YTDL_BIN".to_string()))?;
    let ffmpeg = ffmpeg.ok_or_else(|| AppError::ToolUnavailable("ffmpeg not found; set FFMPEG_BIN".to_string()))?;
    if zip.is_none() {
        log::warn!("zip not found; playlist export is disabled");
    }

    Ok(Tools { ytdlp, ffmpeg, zip })
}

//! Progress line grammar for extractor output.
//!
//! ```text
//! line      := percent-line | terminal-line | other
//! percent   := "[download]" ... NUMBER "%" ...
//! terminal  := contains one of TERMINAL_MARKERS
//! ```
//!
//! Terminal markers announce post-processing: the download itself is over
//! but the encoded file is not final yet.

use once_cell::sync::Lazy;
use regex::Regex;

/// Substrings that mark the post-download phase.
pub const TERMINAL_MARKERS: &[&str] = &[
    "[ExtractAudio]",
    "[Merger]",
    "[ffmpeg]",
    "[Fixup",
    "Post-process",
    "Deleting original file",
];

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)%").expect("percent regex"));

/// What one output line says about job progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    /// Download percentage, clamped to 0..=100
    Percent(u8),
    /// Post-processing started
    Finalizing,
}

/// Parses one stdout/stderr line of the extractor.
///
/// # Examples
/// ```
/// use cdmix::download::progress::{parse_progress_line, ProgressSignal};
///
/// assert_eq!(
///     parse_progress_line("[download]  45.2% of 3.10MiB at 1.2MiB/s ETA 00:02"),
///     Some(ProgressSignal::Percent(45))
/// );
/// assert_eq!(
///     parse_progress_line("[ExtractAudio] Destination: a.mp3"),
///     Some(ProgressSignal::Finalizing)
/// );
/// assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
/// ```
pub fn parse_progress_line(line: &str) -> Option<ProgressSignal> {
    if TERMINAL_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(ProgressSignal::Finalizing);
    }
    if !line.contains("[download]") {
        return None;
    }
    let captures = PERCENT_RE.captures(line)?;
    let value: f32 = captures.get(1)?.as_str().parse().ok()?;
    Some(ProgressSignal::Percent(value.clamp(0.0, 100.0) as u8))
}

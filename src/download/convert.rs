//! ffmpeg transcodes for one-off conversions.

use std::path::Path;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, ToolCommand};
use crate::core::utils::{remove_file_quietly, truncate_tail_utf8};
use crate::core::validation::ConvertTarget;

/// ffmpeg arguments turning `input` into `output` in the target container.
pub fn transcode_args(input: &Path, output: &Path, target: ConvertTarget) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-vn".to_string(),
    ];
    match target {
        ConvertTarget::Mp3 => args.extend(
            ["-codec:a", "libmp3lame", "-b:a", config::download::MP3_BITRATE]
                .iter()
                .map(|s| s.to_string()),
        ),
        // CD audio: 16-bit PCM, 44.1 kHz, stereo
        ConvertTarget::Wav => args.extend(
            ["-codec:a", "pcm_s16le", "-ar", "44100", "-ac", "2"]
                .iter()
                .map(|s| s.to_string()),
        ),
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Transcodes `input` to `output`. A failed run leaves no output file behind.
pub async fn transcode(ffmpeg: &ToolCommand, input: &Path, output: &Path, target: ConvertTarget) -> Result<(), AppError> {
    let args = transcode_args(input, output, target);
    log::info!(
        "Transcoding {} -> {} ({})",
        input.display(),
        output.display(),
        target.extension()
    );

    let result = run_with_timeout(ffmpeg, &args, config::download::transcode_timeout()).await;
    match result {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => {
            log::error!("ffmpeg exited with {:?} for {}", out.exit_code, input.display());
            remove_file_quietly(output).await;
            Err(AppError::Job {
                message: format!("transcode to {} failed", target.extension()),
                stderr: truncate_tail_utf8(&out.stderr, 4000),
            })
        }
        Err(e) => {
            remove_file_quietly(output).await;
            Err(e)
        }
    }
}

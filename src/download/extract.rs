//! Extract-and-encode jobs.
//!
//! `AudioExtractor` is the seam between job orchestration and the external
//! tools. The yt-dlp implementation streams every output line to the caller
//! so progress can be tracked while the job runs.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::{run_streaming, ProcessOutput, ToolCommand};
use crate::core::utils::remove_file_quietly;
use crate::core::validation::ConvertTarget;
use crate::download::convert;
use crate::download::failure::log_failure;

/// One job's inputs.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub url: Url,
    /// Explicit format; `bestaudio` when absent
    pub format_id: Option<String>,
    /// Player client the format id was probed with
    pub client: String,
    /// Directory receiving the finished file
    pub output_dir: PathBuf,
    /// Directory for intermediate files
    pub scratch_dir: PathBuf,
    /// Every file the job creates starts with this prefix
    pub job_prefix: String,
}

impl ExtractRequest {
    pub fn format_selector(&self) -> &str {
        self.format_id.as_deref().filter(|f| !f.is_empty()).unwrap_or("bestaudio")
    }
}

/// A finished file plus whatever metadata the extractor printed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub video_id: Option<String>,
}

#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Downloads and encodes a playlist track (MP3) into `output_dir`,
    /// forwarding each output line to `lines`.
    async fn extract(
        &self,
        request: &ExtractRequest,
        lines: mpsc::UnboundedSender<String>,
    ) -> Result<ExtractedAudio, AppError>;

    /// Downloads the source audio into `scratch_dir` and transcodes it to
    /// `target` inside `output_dir`.
    async fn convert(&self, request: &ExtractRequest, target: ConvertTarget) -> Result<ExtractedAudio, AppError>;
}

#[derive(Debug, Default, Deserialize)]
struct PrintedInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

/// Recovers the output path (last stdout line) and the printed info JSON.
pub fn parse_extract_output(output: &ProcessOutput) -> Option<ExtractedAudio> {
    let path = output.last_stdout_line().filter(|line| !line.starts_with('{'))?;
    let info: PrintedInfo = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str(line).ok())
        .last()
        .unwrap_or_default();
    Some(ExtractedAudio {
        path: PathBuf::from(path),
        title: info.title,
        duration: info.duration.filter(|d| d.is_finite() && *d >= 0.0),
        thumbnail: info.thumbnail,
        video_id: info.id,
    })
}

/// Removes every file in `dir` whose name starts with `prefix`.
pub async fn remove_job_files(dir: &Path, prefix: &str) -> usize {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(prefix) && remove_file_quietly(&entry.path()).await {
            removed += 1;
        }
    }
    if removed > 0 {
        log::debug!("Removed {} partial file(s) for job {}", removed, prefix);
    }
    removed
}

/// yt-dlp + ffmpeg backed extractor.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    pub ytdlp: ToolCommand,
    pub ffmpeg: ToolCommand,
    pub cookies_file: Option<String>,
    pub timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(ytdlp: ToolCommand, ffmpeg: ToolCommand, cookies_file: Option<String>) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            cookies_file,
            timeout: config::download::extract_timeout(),
        }
    }

    fn common_args(&self, request: &ExtractRequest, dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            request.format_selector().to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", request.client),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.clone());
        }
        args.push("--ffmpeg-location".to_string());
        args.push(self.ffmpeg.program.clone());
        args.push("-o".to_string());
        args.push(dir.join(format!("{}.%(ext)s", request.job_prefix)).to_string_lossy().into_owned());
        args
    }

    fn print_args(args: &mut Vec<String>) {
        args.push("--print".to_string());
        args.push("after_move:%(.{id,title,duration,thumbnail})j".to_string());
        // The output path must stay the last printed line.
        args.push("--print".to_string());
        args.push("after_move:filepath".to_string());
    }

    /// Arguments for a playlist-track job: extract audio and encode to MP3.
    pub fn extract_args(&self, request: &ExtractRequest) -> Vec<String> {
        let mut args = self.common_args(request, &request.output_dir);
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            config::download::MP3_BITRATE.to_uppercase(),
        ]);
        Self::print_args(&mut args);
        args.push(request.url.as_str().to_string());
        args
    }

    /// Arguments for fetching the untouched source audio.
    pub fn source_args(&self, request: &ExtractRequest) -> Vec<String> {
        let mut args = self.common_args(request, &request.scratch_dir);
        Self::print_args(&mut args);
        args.push(request.url.as_str().to_string());
        args
    }

    async fn run_ytdlp(
        &self,
        args: Vec<String>,
        cleanup_dir: &Path,
        request: &ExtractRequest,
        lines: mpsc::UnboundedSender<String>,
    ) -> Result<ExtractedAudio, AppError> {
        log::info!(
            "Starting job {} for {} (format {}, client {})",
            request.job_prefix,
            request.url,
            request.format_selector(),
            request.client
        );
        let output = match run_streaming(&self.ytdlp, &args, self.timeout, lines).await {
            Ok(output) => output,
            Err(e) => {
                remove_job_files(cleanup_dir, &request.job_prefix).await;
                return Err(e);
            }
        };

        if !output.success() {
            let kind = log_failure(&format!("job {} failed", request.job_prefix), &output.stderr);
            remove_job_files(cleanup_dir, &request.job_prefix).await;
            return Err(AppError::Job {
                message: kind.message().to_string(),
                stderr: output.stderr,
            });
        }

        match parse_extract_output(&output) {
            Some(extracted) if tokio::fs::metadata(&extracted.path).await.is_ok() => Ok(extracted),
            _ => {
                log::error!("Job {} exited cleanly but produced no output file", request.job_prefix);
                remove_job_files(cleanup_dir, &request.job_prefix).await;
                Err(AppError::Job {
                    message: "extractor did not report an output file".to_string(),
                    stderr: output.stderr,
                })
            }
        }
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        request: &ExtractRequest,
        lines: mpsc::UnboundedSender<String>,
    ) -> Result<ExtractedAudio, AppError> {
        let args = self.extract_args(request);
        self.run_ytdlp(args, &request.output_dir, request, lines).await
    }

    async fn convert(&self, request: &ExtractRequest, target: ConvertTarget) -> Result<ExtractedAudio, AppError> {
        let (lines, mut rx) = mpsc::unbounded_channel();
        let drain = async move { while rx.recv().await.is_some() {} };
        let args = self.source_args(request);
        let (source, ()) = tokio::join!(self.run_ytdlp(args, &request.scratch_dir, request, lines), drain);
        let source = source?;

        let output_path = request
            .output_dir
            .join(format!("{}.{}", request.job_prefix, target.extension()));
        let transcoded = convert::transcode(&self.ffmpeg, &source.path, &output_path, target).await;
        remove_file_quietly(&source.path).await;
        transcoded?;

        Ok(ExtractedAudio {
            path: output_path,
            ..source
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractRequest {
        ExtractRequest {
            url: Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            format_id: Some("251".into()),
            client: "ios".into(),
            output_dir: PathBuf::from("/data/tracks/k"),
            scratch_dir: PathBuf::from("/data/scratch/k"),
            job_prefix: "abc123-xyz".into(),
        }
    }

    fn extractor() -> YtDlpExtractor {
        YtDlpExtractor::new(ToolCommand::new("yt-dlp"), ToolCommand::new("/usr/bin/ffmpeg"), None)
    }

    #[test]
    fn test_extract_args() {
        let args = extractor().extract_args(&request());
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "251"));
        assert!(args.windows(2).any(|w| w[0] == "--audio-format" && w[1] == "mp3"));
        assert!(args.windows(2).any(|w| w[0] == "--audio-quality" && w[1] == "192K"));
        assert!(args.contains(&"youtube:player_client=ios".to_string()));
        assert!(args.contains(&"/data/tracks/k/abc123-xyz.%(ext)s".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--ffmpeg-location" && w[1] == "/usr/bin/ffmpeg"));
        assert!(!args.contains(&"--cookies".to_string()));
        let print_path = args.iter().position(|a| a == "after_move:filepath").unwrap();
        let print_json = args.iter().position(|a| a.starts_with("after_move:%(")).unwrap();
        assert!(print_json < print_path);
    }

    #[test]
    fn test_source_args_write_to_scratch_without_reencoding() {
        let mut req = request();
        req.format_id = None;
        let args = extractor().source_args(&req);
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "bestaudio"));
        assert!(args.contains(&"/data/scratch/k/abc123-xyz.%(ext)s".to_string()));
        assert!(!args.contains(&"-x".to_string()));
    }

    #[test]
    fn test_parse_extract_output() {
        let output = ProcessOutput {
            exit_code: Some(0),
            stdout: "[download]  10.0% of 3MiB\n\
                     {\"id\": \"dQw4w9WgXcQ\", \"title\": \"Song\", \"duration\": 212.0, \"thumbnail\": null}\n\
                     /data/tracks/k/abc123-xyz.mp3\n"
                .into(),
            stderr: String::new(),
        };
        let parsed = parse_extract_output(&output).unwrap();
        assert_eq!(parsed.path, PathBuf::from("/data/tracks/k/abc123-xyz.mp3"));
        assert_eq!(parsed.title.as_deref(), Some("Song"));
        assert_eq!(parsed.duration, Some(212.0));
        assert_eq!(parsed.video_id.as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_parse_extract_output_without_path() {
        let output = ProcessOutput {
            exit_code: Some(0),
            stdout: "{\"title\": \"Song\"}\n".into(),
            stderr: String::new(),
        };
        assert!(parse_extract_output(&output).is_none());
        assert!(parse_extract_output(&ProcessOutput::default()).is_none());
    }

    #[tokio::test]
    async fn test_remove_job_files_only_touches_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job1.webm.part"), b"x").unwrap();
        std::fs::write(dir.path().join("job1.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("job2.mp3"), b"x").unwrap();

        assert_eq!(remove_job_files(dir.path(), "job1").await, 2);
        assert!(dir.path().join("job2.mp3").exists());
    }
}

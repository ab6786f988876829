//! Shared fixtures for the integration tests: fake extractor tooling and a
//! fully wired `AppState` rooted in a temporary directory.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use url::Url;

use cdmix::core::error::AppError;
use cdmix::core::process::ToolCommand;
use cdmix::core::validation::ConvertTarget;
use cdmix::download::error::ProbeError;
use cdmix::download::extract::{AudioExtractor, ExtractRequest, ExtractedAudio};
use cdmix::download::formats::{choose_best, FormatDescriptor};
use cdmix::download::probe::{MetadataSource, ProbeResult};
use cdmix::session::manager::SessionSettings;
use cdmix::session::tokens::TokenSettings;
use cdmix::web::{AppState, ServerSettings};

pub const SESSION_A: &str = "integration-session-aaaa";
pub const SESSION_B: &str = "integration-session-bbbb";
pub const VIDEO_URL: &str = "https://youtu.be/dQw4w9WgXcQ";

pub fn audio_format(id: &str, acodec: &str, abr: f64, asr: u32) -> FormatDescriptor {
    FormatDescriptor {
        format_id: id.to_string(),
        ext: Some("webm".to_string()),
        acodec: Some(acodec.to_string()),
        vcodec: Some("none".to_string()),
        abr: Some(abr),
        tbr: Some(abr),
        asr: Some(asr),
        format_note: None,
        filesize: None,
    }
}

/// Metadata source answering every client with the same format list.
pub struct FakeSource {
    pub title: String,
    pub formats: Vec<FormatDescriptor>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn cd_quality() -> Self {
        Self::with_formats(vec![
            audio_format("140", "mp4a.40.2", 129.5, 44100),
            audio_format("251", "opus", 135.0, 48000),
        ])
    }

    pub fn with_formats(formats: Vec<FormatDescriptor>) -> Self {
        Self {
            title: "Never Gonna Give You Up".to_string(),
            formats,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn fetch(&self, _url: &Url, client: &str) -> Result<ProbeResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeResult {
            title: self.title.clone(),
            duration: Some(213.0),
            thumbnail: None,
            best_format: choose_best(&self.formats),
            audio_formats: self.formats.clone(),
            used_client: client.to_string(),
            total_formats: self.formats.len(),
        })
    }
}

/// Extractor that writes small files instead of running yt-dlp.
///
/// With `gate` set, `extract` announces itself on `started` after emitting
/// its progress lines and then waits for the gate before finishing.
#[derive(Default)]
pub struct FakeExtractor {
    pub duration: f64,
    pub fail: bool,
    pub lines: Vec<String>,
    pub gate: Option<Arc<Notify>>,
    pub started: Arc<Notify>,
    pub calls: AtomicUsize,
    /// Player client of every request, in arrival order
    pub clients: std::sync::Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            lines: vec![
                "[download]  12.0% of 3.20MiB at 1.00MiB/s ETA 00:03".to_string(),
                "[download] 100% of 3.20MiB".to_string(),
                "[ExtractAudio] Destination: track.mp3".to_string(),
            ],
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0.0)
        }
    }

    pub fn gated(duration: f64, lines: &[&str]) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let extractor = Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            gate: Some(Arc::clone(&gate)),
            ..Self::new(duration)
        };
        (extractor, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn clients(&self) -> Vec<String> {
        self.clients.lock().unwrap().clone()
    }

    fn record(&self, request: &ExtractRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().push(request.client.clone());
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract(
        &self,
        request: &ExtractRequest,
        lines: mpsc::UnboundedSender<String>,
    ) -> Result<ExtractedAudio, AppError> {
        self.record(request);
        for line in &self.lines {
            let _ = lines.send(line.clone());
        }
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail {
            let partial = request.output_dir.join(format!("{}.mp3.part", request.job_prefix));
            tokio::fs::write(&partial, b"partial").await?;
            return Err(AppError::Job {
                message: "extractor exited with code 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }

        let path = request.output_dir.join(format!("{}.mp3", request.job_prefix));
        tokio::fs::write(&path, b"ID3fake-mp3-payload").await?;
        Ok(ExtractedAudio {
            path,
            title: Some(format!("Track {}", self.calls())),
            duration: Some(self.duration),
            thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string()),
            video_id: Some("dQw4w9WgXcQ".to_string()),
        })
    }

    async fn convert(&self, request: &ExtractRequest, target: ConvertTarget) -> Result<ExtractedAudio, AppError> {
        self.record(request);
        let path = request
            .output_dir
            .join(format!("{}.{}", request.job_prefix, target.extension()));
        tokio::fs::write(&path, b"converted-audio").await?;
        Ok(ExtractedAudio {
            path,
            title: Some("Never Gonna Give You Up".to_string()),
            duration: Some(213.0),
            thumbnail: None,
            video_id: Some("dQw4w9WgXcQ".to_string()),
        })
    }
}

pub fn settings(root: &Path) -> ServerSettings {
    ServerSettings {
        sessions: SessionSettings {
            data_dir: root.to_path_buf(),
            idle_ttl: Duration::from_secs(3600),
            capacity_seconds: 4800,
        },
        tokens: TokenSettings {
            ttl: Duration::from_secs(900),
            redeem_extension: Duration::from_secs(120),
        },
        pinned_client: None,
        cookie_secure: false,
        static_dir: None,
    }
}

pub fn state_with(
    root: &Path,
    source: Arc<FakeSource>,
    extractor: Arc<FakeExtractor>,
    zip: Option<ToolCommand>,
) -> AppState {
    AppState::new(settings(root), source, extractor, zip)
}

pub fn state(root: &Path, extractor: Arc<FakeExtractor>) -> AppState {
    state_with(root, Arc::new(FakeSource::cd_quality()), extractor, None)
}

/// Files directly inside `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

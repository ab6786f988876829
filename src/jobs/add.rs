//! Add-to-playlist orchestration.
//!
//! ```text
//! Requested ──canceled?──> Canceled (no subprocess)
//!     │
//!     v
//!  Running ──exit 0 + path──> canceled? ──yes──> Canceled (file deleted)
//!     │                          │no
//!     │                          v
//!     │                       Added (progress 100)
//!     └──failure──> Failed (partial files deleted, progress 0)
//! ```
//!
//! Every terminal state clears the token's cancel mark. Cancellation never
//! kills the subprocess; a cancel recorded before the completion check
//! keeps the track out of the playlist.

use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::core::error::AppError;
use crate::core::utils::{random_id, remove_file_quietly};
use crate::download::extract::{remove_job_files, AudioExtractor, ExtractRequest};
use crate::download::progress::parse_progress_line;
use crate::jobs::cancel::CancelRegistry;
use crate::jobs::progress::{ProgressSnapshot, ProgressTable};
use crate::jobs::JobKey;
use crate::session::context::SessionContext;
use crate::session::playlist::Track;

const TRACK_ID_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct AddRequest {
    /// Canonical URL
    pub url: Url,
    pub video_id: Option<String>,
    pub format_id: Option<String>,
    /// Client the format was probed with
    pub client: Option<String>,
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(Track),
    Canceled,
}

/// Drives add jobs and owns the progress and cancel tables.
#[derive(Clone)]
pub struct AddOrchestrator {
    extractor: Arc<dyn AudioExtractor>,
    progress: Arc<ProgressTable>,
    cancels: Arc<CancelRegistry>,
    /// Used when a request names no client
    default_client: String,
}

impl AddOrchestrator {
    pub fn new(
        extractor: Arc<dyn AudioExtractor>,
        progress: Arc<ProgressTable>,
        cancels: Arc<CancelRegistry>,
        default_client: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            progress,
            cancels,
            default_client: default_client.into(),
        }
    }

    pub fn progress_table(&self) -> &ProgressTable {
        &self.progress
    }

    pub fn cancel_registry(&self) -> &CancelRegistry {
        &self.cancels
    }

    /// Records an out-of-band cancellation for the session's token.
    pub async fn cancel(&self, ctx: &SessionContext, token: &str) {
        self.cancels.mark(JobKey::new(ctx.key(), token)).await;
    }

    pub async fn progress(&self, ctx: &SessionContext, token: &str) -> ProgressSnapshot {
        self.progress.snapshot(&JobKey::new(ctx.key(), token)).await
    }

    async fn settle(&self, key: JobKey, success: bool) {
        self.cancels.clear(&key).await;
        self.progress.finish(key, success).await;
    }

    pub async fn add(&self, ctx: &Arc<SessionContext>, request: AddRequest) -> Result<AddOutcome, AppError> {
        let key = JobKey::new(ctx.key(), &request.client_token);
        self.progress.start(key.clone()).await;

        if self.cancels.is_canceled(&key).await {
            log::info!("Add {} canceled before start", key);
            self.settle(key, false).await;
            return Ok(AddOutcome::Canceled);
        }

        let _busy = ctx.begin_job();
        let track_id = random_id(TRACK_ID_LEN);
        let job = ExtractRequest {
            url: request.url.clone(),
            format_id: request.format_id.clone(),
            client: request
                .client
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| self.default_client.clone()),
            output_dir: ctx.dirs().tracks.clone(),
            scratch_dir: ctx.dirs().scratch.clone(),
            job_prefix: format!("{}-{}", track_id, random_id(6)),
        };

        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
        let follow = async {
            while let Some(line) = lines_rx.recv().await {
                if let Some(signal) = parse_progress_line(&line) {
                    self.progress.record(key.clone(), signal).await;
                }
            }
        };
        let (result, ()) = tokio::join!(self.extractor.extract(&job, lines_tx), follow);

        let extracted = match result {
            Ok(extracted) => extracted,
            Err(e) => {
                log::warn!("Add {} failed: {}", key, e);
                remove_job_files(&job.output_dir, &job.job_prefix).await;
                remove_job_files(&job.scratch_dir, &job.job_prefix).await;
                self.settle(key, false).await;
                return Err(e);
            }
        };

        if self.cancels.is_canceled(&key).await {
            log::info!("Add {} finished after cancel, discarding {}", key, extracted.path.display());
            remove_file_quietly(&extracted.path).await;
            remove_job_files(&job.output_dir, &job.job_prefix).await;
            self.settle(key, false).await;
            return Ok(AddOutcome::Canceled);
        }

        let size_bytes = match tokio::fs::metadata(&extracted.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::error!("Add {} output vanished: {}", key, e);
                self.settle(key, false).await;
                return Err(AppError::Job {
                    message: "encoded file disappeared".to_string(),
                    stderr: String::new(),
                });
            }
        };

        let track = Track {
            id: track_id,
            title: extracted
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            duration: extracted.duration.unwrap_or(0.0),
            path: extracted.path,
            size_bytes,
            video_id: extracted.video_id.or(request.video_id),
            thumbnail: extracted.thumbnail,
        };
        ctx.playlist.lock().await.add(track.clone());
        self.settle(key.clone(), true).await;
        log::info!("Add {} finished: '{}' ({:.0}s)", key, track.title, track.duration);

        Ok(AddOutcome::Added(track))
    }
}

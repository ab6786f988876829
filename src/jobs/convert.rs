//! One-off conversions and playlist exports, both delivered through
//! download tokens.

use serde::Serialize;
use std::sync::Arc;

use crate::core::error::AppError;
use crate::core::process::ToolCommand;
use crate::core::utils::{escape_filename, random_id, remove_file_quietly};
use crate::core::validation::{CanonicalUrl, ConvertTarget};
use crate::download::export::{bundle, ExportEntry};
use crate::download::extract::{AudioExtractor, ExtractRequest};
use crate::download::probe::{ProbeMode, Prober};
use crate::session::context::SessionContext;
use crate::session::tokens::DownloadTokenIssuer;

/// Response body for a prepared download.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub ok: bool,
    pub href: String,
    pub filename: String,
    pub size_bytes: u64,
}

pub fn download_href(token: &str) -> String {
    format!("/downloads/{}", token)
}

#[derive(Clone)]
pub struct ConvertOrchestrator {
    prober: Prober,
    extractor: Arc<dyn AudioExtractor>,
    tokens: Arc<DownloadTokenIssuer>,
    zip: Option<ToolCommand>,
}

impl ConvertOrchestrator {
    pub fn new(
        prober: Prober,
        extractor: Arc<dyn AudioExtractor>,
        tokens: Arc<DownloadTokenIssuer>,
        zip: Option<ToolCommand>,
    ) -> Self {
        Self {
            prober,
            extractor,
            tokens,
            zip,
        }
    }

    /// Converts `url` to `target` and issues a download token for the result.
    ///
    /// Without an explicit format the URL is probed first; when no format
    /// qualifies the caller gets the full candidate list back.
    pub async fn convert(
        &self,
        ctx: &Arc<SessionContext>,
        url: &CanonicalUrl,
        target: ConvertTarget,
        format_id: Option<String>,
    ) -> Result<Delivery, AppError> {
        let _busy = ctx.begin_job();

        let (format_id, client) = match format_id.filter(|f| !f.trim().is_empty()) {
            Some(format_id) => (format_id, None),
            None => {
                let probed = self.prober.probe(&url.url, ProbeMode::Smart).await?;
                match probed.best_format {
                    Some(best) => (best.format_id, Some(probed.used_client)),
                    None => {
                        return Err(AppError::NoSuitableFormat {
                            formats: probed.audio_formats,
                        })
                    }
                }
            }
        };

        let job = ExtractRequest {
            url: url.url.clone(),
            format_id: Some(format_id),
            client: client.unwrap_or_else(|| self.prober.default_client().to_string()),
            output_dir: ctx.dirs().public.clone(),
            scratch_dir: ctx.dirs().scratch.clone(),
            job_prefix: format!("convert-{}", random_id(10)),
        };
        let converted = self.extractor.convert(&job, target).await?;

        let size_bytes = match tokio::fs::metadata(&converted.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                remove_file_quietly(&converted.path).await;
                return Err(AppError::Job {
                    message: format!("converted file missing: {}", e),
                    stderr: String::new(),
                });
            }
        };
        let title = converted
            .title
            .as_deref()
            .or(url.video_id.as_deref())
            .unwrap_or("audio");
        let filename = format!("{}.{}", escape_filename(title), target.extension());
        let token = self.tokens.issue(ctx, converted.path.clone(), filename.clone()).await;

        Ok(Delivery {
            ok: true,
            href: download_href(&token),
            filename,
            size_bytes,
        })
    }

    /// Bundles the playlist, in order, into one archive.
    pub async fn export(&self, ctx: &Arc<SessionContext>) -> Result<Delivery, AppError> {
        let zip = self
            .zip
            .as_ref()
            .ok_or_else(|| AppError::ToolUnavailable("zip is not installed; export is disabled".to_string()))?;

        let entries: Vec<ExportEntry> = ctx
            .playlist
            .lock()
            .await
            .items()
            .iter()
            .map(|track| ExportEntry {
                title: track.title.clone(),
                path: track.path.clone(),
            })
            .collect();

        let _busy = ctx.begin_job();
        let stamp = random_id(8);
        let output = ctx.dirs().public.join(format!("cd-{}.zip", stamp));
        let staging = ctx.dirs().scratch.join(format!("export-{}", stamp));
        let size_bytes = bundle(zip, &entries, &staging, &output).await?;

        let filename = "cdmix-playlist.zip".to_string();
        let token = self.tokens.issue(ctx, output, filename.clone()).await;
        Ok(Delivery {
            ok: true,
            href: download_href(&token),
            filename,
            size_bytes,
        })
    }
}

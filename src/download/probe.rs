//! Metadata probing with player-client racing.
//!
//! A probe asks the extractor for title, duration, thumbnail and formats
//! without downloading media. In smart mode every candidate client is asked
//! at once and the winner is picked only after all of them have settled.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, ToolCommand};
use crate::download::error::ProbeError;
use crate::download::formats::{audio_formats, choose_best, has_cd_quality_audio, FormatDescriptor};
use crate::download::failure::log_failure;

/// What the caller learns about a URL before adding or converting it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub best_format: Option<FormatDescriptor>,
    pub audio_formats: Vec<FormatDescriptor>,
    pub used_client: String,
    /// Number of formats of any kind the extractor exposed
    #[serde(skip)]
    pub total_formats: usize,
}

/// Probe flavour requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// One fixed client, lowest latency
    Fast,
    /// Race every candidate client and keep the best answer
    Smart,
}

impl ProbeMode {
    pub fn from_fast_flag(fast: bool) -> Self {
        if fast {
            ProbeMode::Fast
        } else {
            ProbeMode::Smart
        }
    }
}

/// Source of metadata for one URL as seen by one player client.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, url: &Url, client: &str) -> Result<ProbeResult, ProbeError>;
}

/// Parses the extractor's `-J` document into a probe result.
pub fn parse_probe_output(stdout: &str, client: &str) -> Result<ProbeResult, ProbeError> {
    let doc: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| ProbeError::ParseFailed(e.to_string()))?;
    let obj = doc
        .as_object()
        .ok_or_else(|| ProbeError::ParseFailed("metadata is not a JSON object".to_string()))?;

    let raw_formats = obj.get("formats").and_then(|f| f.as_array()).cloned().unwrap_or_default();
    let total_formats = raw_formats.len();
    let audio = audio_formats(raw_formats.iter().filter_map(FormatDescriptor::from_json));
    let best_format = choose_best(&audio);

    Ok(ProbeResult {
        title: obj
            .get("title")
            .and_then(|t| t.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled")
            .to_string(),
        duration: obj
            .get("duration")
            .and_then(|d| d.as_f64())
            .filter(|d| d.is_finite() && *d >= 0.0),
        thumbnail: obj.get("thumbnail").and_then(|t| t.as_str()).map(str::to_string),
        best_format,
        audio_formats: audio,
        used_client: client.to_string(),
        total_formats,
    })
}

/// yt-dlp backed metadata source.
pub struct YtDlpMetadataSource {
    tool: ToolCommand,
    cookies_file: Option<String>,
    timeout: Duration,
}

impl YtDlpMetadataSource {
    pub fn new(tool: ToolCommand, cookies_file: Option<String>) -> Self {
        Self {
            tool,
            cookies_file,
            timeout: config::download::probe_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_args(&self, url: &Url, client: &str) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
            "--extractor-args".to_string(),
            format!("youtube:player_client={}", client),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.clone());
        }
        args.push(url.as_str().to_string());
        args
    }
}

#[async_trait]
impl MetadataSource for YtDlpMetadataSource {
    async fn fetch(&self, url: &Url, client: &str) -> Result<ProbeResult, ProbeError> {
        let args = self.build_args(url, client);
        log::debug!("probe [{}]: {} {}", client, self.tool.display(), args.join(" "));

        let output = run_with_timeout(&self.tool, &args, self.timeout)
            .await
            .map_err(|e| match e {
                AppError::Job { .. } => ProbeError::Timeout(self.timeout.as_secs()),
                other => ProbeError::Spawn(other.to_string()),
            })?;

        if !output.success() {
            log_failure(&format!("probe [{}] failed for {}", client, url), &output.stderr);
            return Err(ProbeError::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        parse_probe_output(&output.stdout, client)
    }
}

/// Candidate clients in trust order. A pinned client replaces the list.
pub fn candidate_clients(mode: ProbeMode, pinned: Option<&str>) -> Vec<String> {
    if let Some(client) = pinned {
        return vec![client.to_string()];
    }
    match mode {
        ProbeMode::Fast => vec![config::clients::FAST_CLIENT.to_string()],
        ProbeMode::Smart => config::clients::SMART_CLIENTS.iter().map(|c| c.to_string()).collect(),
    }
}

/// Picks the winning result once every candidate has settled.
///
/// 1. first result in list order that succeeded and has an audio-only
///    format at 44100 Hz or more
/// 2. otherwise the successful result exposing the most formats (earliest wins ties)
/// 3. otherwise the first result, so the reported error is deterministic
pub fn select_probe_result(
    results: Vec<Result<ProbeResult, ProbeError>>,
) -> Option<Result<ProbeResult, ProbeError>> {
    let cd_quality = results
        .iter()
        .position(|r| matches!(r, Ok(p) if has_cd_quality_audio(&p.audio_formats)));
    if let Some(index) = cd_quality {
        return results.into_iter().nth(index);
    }

    let mut richest: Option<(usize, usize)> = None;
    for (index, result) in results.iter().enumerate() {
        if let Ok(p) = result {
            if richest.map_or(true, |(_, count)| p.total_formats > count) {
                richest = Some((index, p.total_formats));
            }
        }
    }
    if let Some((index, _)) = richest {
        return results.into_iter().nth(index);
    }

    results.into_iter().next()
}

/// Runs fast or smart probes against a metadata source.
#[derive(Clone)]
pub struct Prober {
    source: Arc<dyn MetadataSource>,
    pinned_client: Option<String>,
}

impl Prober {
    pub fn new(source: Arc<dyn MetadataSource>, pinned_client: Option<String>) -> Self {
        Self { source, pinned_client }
    }

    /// Client for jobs that arrive without one: the pinned client when set.
    pub fn default_client(&self) -> &str {
        self.pinned_client.as_deref().unwrap_or(config::clients::FAST_CLIENT)
    }

    pub async fn probe(&self, url: &Url, mode: ProbeMode) -> Result<ProbeResult, ProbeError> {
        let clients = candidate_clients(mode, self.pinned_client.as_deref());
        log::info!("Probing {} ({:?}, clients: {})", url, mode, clients.join(","));

        let attempts = clients.iter().map(|client| self.source.fetch(url, client));
        let results = join_all(attempts).await;

        for (client, result) in clients.iter().zip(&results) {
            match result {
                Ok(p) => log::debug!(
                    "probe [{}]: ok, {} formats, {} audio, cd quality: {}",
                    client,
                    p.total_formats,
                    p.audio_formats.len(),
                    has_cd_quality_audio(&p.audio_formats)
                ),
                Err(e) => log::debug!("probe [{}]: {}", client, e),
            }
        }

        let selected = select_probe_result(results).unwrap_or_else(|| {
            Err(ProbeError::Failed {
                exit_code: None,
                stderr: "no player clients to try".to_string(),
            })
        });
        match &selected {
            Ok(p) => log::info!("Probe of {} answered by client '{}': {}", url, p.used_client, p.title),
            Err(e) => log::warn!("Probe of {} failed: {}", url, e),
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn result(client: &str, asr: u32, extra_formats: usize) -> ProbeResult {
        let format = FormatDescriptor {
            format_id: "251".into(),
            ext: Some("webm".into()),
            acodec: Some("opus".into()),
            vcodec: Some("none".into()),
            abr: Some(128.0),
            tbr: None,
            asr: Some(asr),
            format_note: None,
            filesize: None,
        };
        ProbeResult {
            title: "Song".into(),
            duration: Some(200.0),
            thumbnail: None,
            best_format: choose_best(std::slice::from_ref(&format)),
            audio_formats: vec![format],
            used_client: client.into(),
            total_formats: 1 + extra_formats,
        }
    }

    fn failure(code: i32) -> ProbeError {
        ProbeError::Failed {
            exit_code: Some(code),
            stderr: format!("ERROR {}", code),
        }
    }

    struct FakeSource {
        answers: HashMap<String, (u64, Result<ProbeResult, ProbeError>)>,
    }

    #[async_trait]
    impl MetadataSource for FakeSource {
        async fn fetch(&self, _url: &Url, client: &str) -> Result<ProbeResult, ProbeError> {
            match self.answers.get(client) {
                Some((delay_ms, answer)) => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                    answer.clone()
                }
                None => Err(failure(2)),
            }
        }
    }

    #[test]
    fn test_select_prefers_list_order_among_cd_quality() {
        let picked = select_probe_result(vec![
            Err(failure(1)),
            Ok(result("b", 44100, 0)),
            Ok(result("c", 48000, 30)),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(picked.used_client, "b");
    }

    #[test]
    fn test_select_falls_back_to_richest_success() {
        let picked = select_probe_result(vec![
            Ok(result("a", 22050, 3)),
            Ok(result("b", 22050, 12)),
            Ok(result("c", 22050, 12)),
            Err(failure(1)),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(picked.used_client, "b");
    }

    #[test]
    fn test_select_returns_first_error_when_all_fail() {
        let picked = select_probe_result(vec![Err(failure(1)), Err(failure(2))]).unwrap();
        assert_eq!(picked.unwrap_err().exit_code(), Some(1));
        assert!(select_probe_result(Vec::new()).is_none());
    }

    #[test]
    fn test_candidate_clients() {
        assert_eq!(candidate_clients(ProbeMode::Fast, None), vec!["android_vr".to_string()]);
        assert_eq!(candidate_clients(ProbeMode::Smart, None).len(), 4);
        assert_eq!(candidate_clients(ProbeMode::Smart, Some("tv")), vec!["tv".to_string()]);
    }

    #[test]
    fn test_default_client_follows_pin() {
        let source = Arc::new(FakeSource { answers: HashMap::new() });
        assert_eq!(Prober::new(source.clone(), None).default_client(), "android_vr");
        assert_eq!(Prober::new(source, Some("tv".to_string())).default_client(), "tv");
    }

    #[tokio::test(start_paused = true)]
    async fn test_smart_probe_uses_list_order_not_completion_order() {
        let mut answers = HashMap::new();
        answers.insert("android_vr".to_string(), (10, Err(failure(1))));
        answers.insert("web_safari".to_string(), (500, Ok(result("web_safari", 44100, 0))));
        answers.insert("ios".to_string(), (5, Err(failure(1))));
        answers.insert("tv".to_string(), (1, Ok(result("tv", 22050, 40))));
        let prober = Prober::new(Arc::new(FakeSource { answers }), None);

        let url = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let picked = prober.probe(&url, ProbeMode::Smart).await.unwrap();
        assert_eq!(picked.used_client, "web_safari");
    }

    #[tokio::test]
    async fn test_fast_probe_uses_single_client() {
        let mut answers = HashMap::new();
        answers.insert("android_vr".to_string(), (0, Ok(result("android_vr", 48000, 0))));
        let prober = Prober::new(Arc::new(FakeSource { answers }), None);

        let url = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let picked = prober.probe(&url, ProbeMode::Fast).await.unwrap();
        assert_eq!(picked.used_client, "android_vr");
    }

    #[test]
    fn test_parse_probe_output() {
        let stdout = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 212,
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
            "formats": [
                {"format_id": "139", "acodec": "mp4a.40.5", "vcodec": "none", "abr": 48.8, "asr": 22050},
                {"format_id": "140", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 129.5, "asr": 44100},
                {"format_id": "251", "acodec": "opus", "vcodec": "none", "abr": 135.1, "asr": 48000},
                {"format_id": "137", "acodec": "none", "vcodec": "avc1.640028", "tbr": 4000}
            ]
        }"#;
        let parsed = parse_probe_output(stdout, "ios").unwrap();
        assert_eq!(parsed.title, "Never Gonna Give You Up");
        assert_eq!(parsed.duration, Some(212.0));
        assert_eq!(parsed.total_formats, 4);
        assert_eq!(parsed.audio_formats.len(), 3);
        assert_eq!(parsed.best_format.unwrap().format_id, "251");
        assert_eq!(parsed.used_client, "ios");
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(matches!(
            parse_probe_output("WARNING: not json", "tv"),
            Err(ProbeError::ParseFailed(_))
        ));
        assert!(matches!(parse_probe_output("[1,2]", "tv"), Err(ProbeError::ParseFailed(_))));
    }

    #[test]
    fn test_build_args_carry_client_and_cookies() {
        let source = YtDlpMetadataSource::new(ToolCommand::new("yt-dlp"), Some("/tmp/cookies.txt".into()));
        let url = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let args = source.build_args(&url, "web_safari");
        assert!(args.contains(&"youtube:player_client=web_safari".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--cookies" && w[1] == "/tmp/cookies.txt"));
        assert_eq!(args.last().unwrap(), url.as_str());
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::config;
use crate::core::process::ToolCommand;
use crate::core::tools::Tools;
use crate::download::extract::{AudioExtractor, YtDlpExtractor};
use crate::download::probe::{MetadataSource, Prober, YtDlpMetadataSource};
use crate::jobs::{AddOrchestrator, CancelRegistry, ConvertOrchestrator, ProgressTable};
use crate::session::manager::{SessionManager, SessionSettings};
use crate::session::tokens::{DownloadTokenIssuer, TokenSettings};

/// Runtime settings the HTTP layer needs besides the collaborators.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub sessions: SessionSettings,
    pub tokens: TokenSettings,
    pub pinned_client: Option<String>,
    pub cookie_secure: bool,
    pub static_dir: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self {
            sessions: SessionSettings::from_env(),
            tokens: TokenSettings::from_env(),
            pinned_client: config::YTDL_PLAYER_CLIENT.clone(),
            cookie_secure: *config::COOKIE_SECURE,
            static_dir: config::STATIC_DIR.clone(),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub tokens: Arc<DownloadTokenIssuer>,
    pub prober: Prober,
    pub adds: AddOrchestrator,
    pub converts: ConvertOrchestrator,
    pub cookie_secure: bool,
    pub static_dir: Option<PathBuf>,
}

/// What one maintenance pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub sessions: usize,
    pub tokens: usize,
    pub progress_entries: usize,
    pub cancel_marks: usize,
}

impl AppState {
    pub fn new(
        settings: ServerSettings,
        source: Arc<dyn MetadataSource>,
        extractor: Arc<dyn AudioExtractor>,
        zip: Option<ToolCommand>,
    ) -> Self {
        let tokens = Arc::new(DownloadTokenIssuer::with_settings(&settings.tokens));
        let prober = Prober::new(source, settings.pinned_client.clone());
        let adds = AddOrchestrator::new(
            Arc::clone(&extractor),
            Arc::new(ProgressTable::default()),
            Arc::new(CancelRegistry::default()),
            prober.default_client(),
        );
        let converts = ConvertOrchestrator::new(prober.clone(), extractor, Arc::clone(&tokens), zip);

        Self {
            sessions: Arc::new(SessionManager::new(settings.sessions)),
            tokens,
            prober,
            adds,
            converts,
            cookie_secure: settings.cookie_secure,
            static_dir: settings.static_dir,
        }
    }

    /// State wired to the located yt-dlp, ffmpeg and zip binaries.
    pub fn from_tools(settings: ServerSettings, tools: &Tools) -> Self {
        let cookies = config::YTDL_COOKIES_FILE.clone();
        let source = Arc::new(YtDlpMetadataSource::new(tools.ytdlp.command.clone(), cookies.clone()));
        let extractor = Arc::new(YtDlpExtractor::new(
            tools.ytdlp.command.clone(),
            tools.ffmpeg.command.clone(),
            cookies,
        ));
        let zip = tools.zip.as_ref().map(|z| z.command.clone());
        Self::new(settings, source, extractor, zip)
    }

    /// Sweeps idle sessions, expired tokens, and stale progress/cancel entries.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let destroyed = self.sessions.sweep_idle(&self.tokens).await;
        report.sessions = destroyed.len();
        for key in &destroyed {
            report.progress_entries += self.adds.progress_table().forget_session(key).await;
            report.cancel_marks += self.adds.cancel_registry().forget_session(key).await;
        }

        report.tokens = self.tokens.sweep().await.len();
        report.progress_entries += self.adds.progress_table().purge_expired().await;
        report.cancel_marks += self.adds.cancel_registry().purge_expired().await;

        if report != MaintenanceReport::default() {
            log::info!("Maintenance: {:?}", report);
        }
        report
    }

    /// Runs `run_maintenance` every sweep interval until the runtime stops.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let state = self.clone();
        let period = self.sessions.settings().sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                state.run_maintenance().await;
            }
        })
    }
}

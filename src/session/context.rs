//! Per-session isolated state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::utils::{fs_key, remove_dir_quietly, remove_file_quietly};
use crate::session::playlist::PlaylistStore;

/// The three directories a session owns, all named by its filesystem key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDirs {
    /// Encoded playlist tracks
    pub tracks: PathBuf,
    /// Intermediate files of running jobs
    pub scratch: PathBuf,
    /// Files handed out through download tokens
    pub public: PathBuf,
}

impl SessionDirs {
    pub fn for_key(root: &Path, key: &str) -> Self {
        Self {
            tracks: root.join("tracks").join(key),
            scratch: root.join("scratch").join(key),
            public: root.join("public").join(key),
        }
    }

    fn all(&self) -> [&Path; 3] {
        [&self.tracks, &self.scratch, &self.public]
    }
}

/// One client's playlist, directories and issued download tokens.
pub struct SessionContext {
    id: String,
    key: String,
    dirs: SessionDirs,
    pub playlist: Mutex<PlaylistStore>,
    tokens: Mutex<HashSet<String>>,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last request
    last_access_ms: AtomicU64,
    active_jobs: AtomicUsize,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("key", &self.key)
            .field("dirs", &self.dirs)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Creates the directory tree under `root` and returns the context.
    pub async fn create(id: &str, root: &Path, capacity_seconds: u64) -> std::io::Result<Self> {
        let key = fs_key(id);
        let dirs = SessionDirs::for_key(root, &key);
        for dir in dirs.all() {
            tokio::fs::create_dir_all(dir).await?;
        }
        log::info!("Session {} created", key);

        Ok(Self {
            id: id.to_string(),
            key,
            dirs,
            playlist: Mutex::new(PlaylistStore::new(capacity_seconds)),
            tokens: Mutex::new(HashSet::new()),
            created_at: Instant::now(),
            last_access_ms: AtomicU64::new(0),
            active_jobs: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Filesystem-safe key derived from the identifier.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dirs(&self) -> &SessionDirs {
        &self.dirs
    }

    pub fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_access_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        let last = self.created_at + Duration::from_millis(self.last_access_ms.load(Ordering::Relaxed));
        now.saturating_duration_since(last)
    }

    /// Marks a long-running job as in flight until the guard drops.
    pub fn begin_job(self: &Arc<Self>) -> JobGuard {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
        JobGuard { ctx: Arc::clone(self) }
    }

    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub async fn remember_token(&self, token: &str) {
        self.tokens.lock().await.insert(token.to_string());
    }

    pub async fn forget_token(&self, token: &str) {
        self.tokens.lock().await.remove(token);
    }

    pub async fn token_count(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn take_tokens(&self) -> Vec<String> {
        self.tokens.lock().await.drain().collect()
    }

    /// Unlinks every track file and removes the directory tree.
    pub async fn destroy(&self) {
        let tracks = self.playlist.lock().await.clear();
        for track in &tracks {
            remove_file_quietly(&track.path).await;
        }
        for dir in self.dirs.all() {
            remove_dir_quietly(dir).await;
        }
        log::info!("Session {} destroyed ({} track(s) unlinked)", self.key, tracks.len());
    }
}

/// Keeps a session marked busy for as long as it lives.
pub struct JobGuard {
    ctx: Arc<SessionContext>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.ctx.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }
}

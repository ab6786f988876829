//! Session lifecycle: exactly-once lazy creation and idle sweeping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{Duration, Instant};

use crate::core::config;
use crate::core::error::AppError;
use crate::session::context::SessionContext;
use crate::session::identity::{resolve_identity, ResolvedIdentity};
use crate::session::tokens::DownloadTokenIssuer;

/// Settings for session storage and expiry.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub data_dir: PathBuf,
    pub idle_ttl: Duration,
    pub capacity_seconds: u64,
}

impl SessionSettings {
    pub fn from_env() -> Self {
        Self {
            data_dir: config::DATA_DIR.clone(),
            idle_ttl: config::session::idle_ttl(),
            capacity_seconds: *config::playlist::CAPACITY_SECONDS,
        }
    }

    /// How often idle sessions are swept: the idle TTL, capped at ten
    /// minutes and never below one second.
    pub fn sweep_interval(&self) -> Duration {
        self.idle_ttl.clamp(
            Duration::from_secs(1),
            Duration::from_secs(config::session::MAX_SWEEP_INTERVAL_SECS),
        )
    }
}

type Slot = Arc<OnceCell<Arc<SessionContext>>>;

/// Maps session identifiers to their contexts.
///
/// Each identifier owns one slot; concurrent first requests share the slot
/// and await the same creation, so a directory tree is made once. A slot
/// whose creation failed is dropped so the next request can retry.
///
/// Known limitation: a plain request handler can race the idle sweep for a
/// session that has been idle for the full TTL. Contexts with running
/// add/convert jobs are never swept.
pub struct SessionManager {
    settings: SessionSettings,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// True for live sessions and sessions whose creation is in flight.
    pub async fn is_known(&self, id: &str) -> bool {
        self.slots.lock().await.contains_key(id)
    }

    /// Resolves a request's identity from its cookie and header hint.
    pub async fn resolve(&self, cookie: Option<&str>, header: Option<&str>) -> ResolvedIdentity {
        let header_is_known = match header {
            Some(h) => self.is_known(h.trim()).await,
            None => false,
        };
        resolve_identity(cookie, header, header_is_known)
    }

    /// Returns the live context, if any, without creating one.
    pub async fn get(&self, id: &str) -> Option<Arc<SessionContext>> {
        let slots = self.slots.lock().await;
        slots.get(id).and_then(|slot| slot.get().cloned())
    }

    /// Returns the context for `id`, creating it on first use.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<SessionContext>, AppError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(id.to_string()).or_default())
        };

        let created = slot
            .get_or_try_init(|| async {
                SessionContext::create(id, &self.settings.data_dir, self.settings.capacity_seconds)
                    .await
                    .map(Arc::new)
            })
            .await;

        match created {
            Ok(ctx) => {
                ctx.touch();
                Ok(Arc::clone(ctx))
            }
            Err(e) => {
                let mut slots = self.slots.lock().await;
                if slots.get(id).is_some_and(|current| Arc::ptr_eq(current, &slot) && current.get().is_none()) {
                    slots.remove(id);
                }
                log::error!("Failed to create session directories: {}", e);
                Err(AppError::Session(format!("could not create session storage: {}", e)))
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Destroys every session idle for longer than the TTL and without
    /// running jobs. Returns the filesystem keys of the destroyed sessions.
    ///
    /// The slot map stays locked during destruction so a returning client
    /// cannot recreate the same directories while they are being removed.
    pub async fn sweep_idle(&self, tokens: &DownloadTokenIssuer) -> Vec<String> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        let idle: Vec<String> = slots
            .iter()
            .filter_map(|(id, slot)| {
                let ctx = slot.get()?;
                (ctx.idle_for(now) >= self.settings.idle_ttl && ctx.active_jobs() == 0).then(|| id.clone())
            })
            .collect();

        let mut destroyed = Vec::with_capacity(idle.len());
        for id in idle {
            let Some(ctx) = slots.remove(&id).and_then(|slot| slot.get().cloned()) else {
                continue;
            };
            let revoked = tokens.revoke_all(&ctx).await;
            ctx.destroy().await;
            log::info!("Swept idle session {} ({} token(s) revoked)", ctx.key(), revoked);
            destroyed.push(ctx.key().to_string());
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(root: &std::path::Path) -> SessionSettings {
        SessionSettings {
            data_dir: root.to_path_buf(),
            idle_ttl: Duration::from_secs(3600),
            capacity_seconds: 4800,
        }
    }

    const ID: &str = "concurrent-first-request-id";

    #[test]
    fn test_sweep_interval_follows_idle_ttl() {
        let root = std::path::Path::new("/tmp");
        let mut settings = settings(root);
        settings.idle_ttl = Duration::from_secs(90);
        assert_eq!(settings.sweep_interval(), Duration::from_secs(90));
        settings.idle_ttl = Duration::from_secs(6 * 60 * 60);
        assert_eq!(settings.sweep_interval(), Duration::from_secs(600));
        settings.idle_ttl = Duration::ZERO;
        assert_eq!(settings.sweep_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_create_once() {
        let root = tempfile::tempdir().unwrap();
        let manager = Arc::new(SessionManager::new(settings(root.path())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_or_create(ID).await.unwrap() })
            })
            .collect();
        let mut contexts = Vec::new();
        for handle in handles {
            contexts.push(handle.await.unwrap());
        }

        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
        assert_eq!(std::fs::read_dir(root.path().join("tracks")).unwrap().count(), 1);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_retryable() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let manager = SessionManager::new(settings(&blocker));

        assert!(matches!(manager.get_or_create(ID).await, Err(AppError::Session(_))));
        assert!(!manager.is_known(ID).await);
    }

    #[tokio::test]
    async fn test_resolve_trusts_known_header() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(root.path()));
        manager.get_or_create(ID).await.unwrap();

        let resolved = manager.resolve(Some("cookie-session-identifier"), Some(ID)).await;
        assert_eq!(resolved.id, ID);
        let resolved = manager
            .resolve(Some("cookie-session-identifier"), Some("unknown-header-identifier"))
            .await;
        assert_eq!(resolved.id, "cookie-session-identifier");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_sessions_only() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(settings(root.path()));
        let tokens = DownloadTokenIssuer::default();

        let idle = manager.get_or_create("idle-session-identifier").await.unwrap();
        let busy = manager.get_or_create("busy-session-identifier").await.unwrap();
        let fresh = manager.get_or_create("fresh-session-identifier").await.unwrap();
        let guard = busy.begin_job();

        tokio::time::advance(Duration::from_secs(3000)).await;
        fresh.touch();
        tokio::time::advance(Duration::from_secs(601)).await;

        let destroyed = manager.sweep_idle(&tokens).await;
        assert_eq!(destroyed, vec![idle.key().to_string()]);
        assert!(!idle.dirs().tracks.exists());
        assert!(busy.dirs().tracks.exists());
        assert!(manager.get("fresh-session-identifier").await.is_some());

        drop(guard);
        let destroyed = manager.sweep_idle(&tokens).await;
        assert_eq!(destroyed, vec![busy.key().to_string()]);
    }
}

use tokio::time::Duration;

use crate::core::config;
use crate::jobs::ttl::TtlMap;
use crate::jobs::JobKey;

/// Tokens whose add was canceled by the client.
///
/// A mark never stops a running subprocess; it only suppresses the
/// playlist registration when the job ends.
pub struct CancelRegistry {
    marks: TtlMap<JobKey, ()>,
    ttl: Duration,
}

impl Default for CancelRegistry {
    fn default() -> Self {
        Self::new(config::progress::cancel_ttl())
    }
}

impl CancelRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            marks: TtlMap::new(),
            ttl,
        }
    }

    pub async fn mark(&self, key: JobKey) {
        log::info!("Add {} canceled by client", key);
        self.marks.insert(key, (), self.ttl).await;
    }

    pub async fn is_canceled(&self, key: &JobKey) -> bool {
        self.marks.contains(key).await
    }

    pub async fn clear(&self, key: &JobKey) {
        self.marks.remove(key).await;
    }

    pub async fn forget_session(&self, session_key: &str) -> usize {
        self.marks.retain_keys(|key| key.session != session_key).await
    }

    pub async fn purge_expired(&self) -> usize {
        self.marks.purge_expired().await
    }
}

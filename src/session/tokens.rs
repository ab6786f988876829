//! Download tokens: short-lived handles to one prepared file.
//!
//! A token is independent of the session cookie, so a copied link still
//! works in a fresh browser until it expires.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::config;
use crate::core::error::AppError;
use crate::core::utils::remove_file_quietly;
use crate::session::context::SessionContext;

#[derive(Debug, Clone)]
struct TokenEntry {
    owner_id: String,
    /// Dangling once the session is gone; its directory goes with it
    owner: Weak<SessionContext>,
    path: PathBuf,
    filename: String,
    expires_at: Instant,
}

/// A token that passed validation, ready to stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    pub token: String,
    pub owner_id: String,
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
}

/// Token lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    pub ttl: Duration,
    pub redeem_extension: Duration,
}

impl TokenSettings {
    pub fn from_env() -> Self {
        Self {
            ttl: config::tokens::ttl(),
            redeem_extension: config::tokens::redeem_extension(),
        }
    }
}

/// Process-wide token index.
pub struct DownloadTokenIssuer {
    entries: Mutex<HashMap<String, TokenEntry>>,
    ttl: Duration,
    redeem_extension: Duration,
}

impl Default for DownloadTokenIssuer {
    fn default() -> Self {
        Self::with_settings(&TokenSettings::from_env())
    }
}

impl DownloadTokenIssuer {
    pub fn new(ttl: Duration, redeem_extension: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            redeem_extension,
        }
    }

    pub fn with_settings(settings: &TokenSettings) -> Self {
        Self::new(settings.ttl, settings.redeem_extension)
    }

    /// Registers `path` for download and records the token on the owning session.
    ///
    /// The issuer owns the file from here on: it is unlinked when the token
    /// is consumed, revoked or expires.
    pub async fn issue(&self, ctx: &Arc<SessionContext>, path: PathBuf, filename: String) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let entry = TokenEntry {
            owner_id: ctx.id().to_string(),
            owner: Arc::downgrade(ctx),
            path,
            filename,
            expires_at: Instant::now() + self.ttl,
        };
        log::info!("Issued download token for {} (session {})", entry.filename, ctx.key());
        self.entries.lock().await.insert(token.clone(), entry);
        ctx.remember_token(&token).await;
        token
    }

    /// Validates a token and re-checks its file.
    ///
    /// Expired tokens and tokens whose file vanished are dropped and reported
    /// as not found. A successful redemption pushes the expiry out a little so
    /// resumed or retried downloads keep working.
    pub async fn redeem(&self, token: &str) -> Result<Redemption, AppError> {
        let entry = {
            let entries = self.entries.lock().await;
            entries.get(token).cloned()
        }
        .ok_or_else(|| AppError::NotFound("download link expired".to_string()))?;

        let now = Instant::now();
        if entry.expires_at <= now {
            self.revoke(token).await;
            return Err(AppError::NotFound("download link expired".to_string()));
        }

        let metadata = match tokio::fs::metadata(&entry.path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                log::warn!("Download token points at a missing file: {}", entry.path.display());
                self.revoke(token).await;
                return Err(AppError::NotFound("file is no longer available".to_string()));
            }
        };

        {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(token) {
                Some(live) => live.expires_at = live.expires_at.max(now + self.redeem_extension),
                None => return Err(AppError::NotFound("download link expired".to_string())),
            }
        }

        Ok(Redemption {
            token: token.to_string(),
            owner_id: entry.owner_id,
            path: entry.path,
            filename: entry.filename,
            size_bytes: metadata.len(),
        })
    }

    /// Drops a token once its transfer completed.
    pub async fn complete(&self, token: &str) {
        if self.revoke(token).await {
            log::info!("Download token consumed");
        }
    }

    /// Removes one token and its file. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        let entry = self.entries.lock().await.remove(token);
        match entry {
            Some(entry) => {
                retire(token, entry).await;
                true
            }
            None => false,
        }
    }

    /// Revokes every token a session issued. The files are left to the
    /// session's own teardown.
    pub async fn revoke_all(&self, ctx: &SessionContext) -> usize {
        let tokens = ctx.take_tokens().await;
        let mut entries = self.entries.lock().await;
        tokens.iter().filter(|t| entries.remove(t.as_str()).is_some()).count()
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.entries.lock().await.contains_key(token)
    }

    /// Removes expired tokens and their files. Returns the tokens removed.
    pub async fn sweep(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<(String, TokenEntry)> = {
            let mut entries = self.entries.lock().await;
            let tokens: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(token, _)| token.clone())
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| entries.remove(&token).map(|entry| (token, entry)))
                .collect()
        };

        let mut removed = Vec::with_capacity(expired.len());
        for (token, entry) in expired {
            retire(&token, entry).await;
            removed.push(token);
        }
        if !removed.is_empty() {
            log::info!("Expired {} download token(s)", removed.len());
        }
        removed
    }
}

/// Detaches an entry already taken out of the index from its session and
/// unlinks its file.
async fn retire(token: &str, entry: TokenEntry) {
    if let Some(owner) = entry.owner.upgrade() {
        owner.forget_token(token).await;
    }
    if remove_file_quietly(&entry.path).await {
        log::debug!("Unlinked {}", entry.path.display());
    }
}

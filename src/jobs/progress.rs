//! Add-job progress table.

use serde::Serialize;
use tokio::time::Duration;

use crate::core::config;
use crate::download::progress::ProgressSignal;
use crate::jobs::ttl::TtlMap;
use crate::jobs::JobKey;

/// Highest value a running job can report
const RUNNING_CAP: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgressEntry {
    percent: u8,
    done: bool,
}

/// What a poll returns. `progress` is `None` for unknown or expired tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub progress: Option<u8>,
    pub done: bool,
}

impl ProgressSnapshot {
    pub fn unknown() -> Self {
        Self {
            progress: None,
            done: false,
        }
    }
}

/// Per-job progress, monotonic while the job runs.
pub struct ProgressTable {
    entries: TtlMap<JobKey, ProgressEntry>,
    active_ttl: Duration,
    done_ttl: Duration,
}

impl Default for ProgressTable {
    fn default() -> Self {
        Self::new(config::progress::active_ttl(), config::progress::done_ttl())
    }
}

impl ProgressTable {
    pub fn new(active_ttl: Duration, done_ttl: Duration) -> Self {
        Self {
            entries: TtlMap::new(),
            active_ttl,
            done_ttl,
        }
    }

    /// Records 0% for a job that is about to start.
    pub async fn start(&self, key: JobKey) {
        self.entries
            .insert(
                key,
                ProgressEntry {
                    percent: 0,
                    done: false,
                },
                self.active_ttl,
            )
            .await;
    }

    /// Applies one parsed output line and returns the recorded value.
    ///
    /// Percentages are capped at 99 and never move backwards; a
    /// finalizing marker jumps straight to 99. Finished jobs are left alone.
    pub async fn record(&self, key: JobKey, signal: ProgressSignal) -> Option<u8> {
        let active_ttl = self.active_ttl;
        self.entries
            .update(key, |prev| {
                let prev = prev.copied().unwrap_or(ProgressEntry {
                    percent: 0,
                    done: false,
                });
                if prev.done {
                    return None;
                }
                let percent = match signal {
                    ProgressSignal::Percent(p) => prev.percent.max(p.min(RUNNING_CAP)),
                    ProgressSignal::Finalizing => RUNNING_CAP,
                };
                Some((ProgressEntry { percent, done: false }, active_ttl))
            })
            .await
            .map(|entry| entry.percent)
    }

    /// Marks the job done: 100 on success, 0 otherwise. Done entries
    /// linger only long enough for a final poll.
    pub async fn finish(&self, key: JobKey, success: bool) {
        let entry = ProgressEntry {
            percent: if success { 100 } else { 0 },
            done: true,
        };
        self.entries.insert(key, entry, self.done_ttl).await;
    }

    pub async fn snapshot(&self, key: &JobKey) -> ProgressSnapshot {
        match self.entries.get(key).await {
            Some(entry) => ProgressSnapshot {
                progress: Some(entry.percent),
                done: entry.done,
            },
            None => ProgressSnapshot::unknown(),
        }
    }

    /// Drops every entry belonging to a session.
    pub async fn forget_session(&self, session_key: &str) -> usize {
        self.entries.retain_keys(|key| key.session != session_key).await
    }

    pub async fn purge_expired(&self) -> usize {
        self.entries.purge_expired().await
    }
}

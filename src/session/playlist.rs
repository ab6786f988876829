//! Per-session playlist ("the CD").

use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::error::AppError;

/// One encoded track on the CD.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Seconds, never negative
    pub duration: f64,
    /// Encoded file owned by this track
    #[serde(skip)]
    pub path: PathBuf,
    pub size_bytes: u64,
    pub video_id: Option<String>,
    pub thumbnail: Option<String>,
}

/// Why a reorder request was refused.
#[derive(Debug, Error, PartialEq)]
pub enum ReorderError {
    #[error("expected {expected} ids, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("duplicate id {0}")]
    Duplicate(String),

    #[error("unknown id {0}")]
    Unknown(String),
}

impl From<ReorderError> for AppError {
    fn from(err: ReorderError) -> Self {
        AppError::Validation(format!("invalid order: {}", err))
    }
}

/// Ordered tracks plus the CD capacity they are measured against.
///
/// Capacity is advisory: additions past it are accepted and callers compare
/// `total_seconds` against `capacity_seconds` themselves.
#[derive(Debug, Clone)]
pub struct PlaylistStore {
    capacity_seconds: u64,
    items: Vec<Track>,
}

impl PlaylistStore {
    pub fn new(capacity_seconds: u64) -> Self {
        Self {
            capacity_seconds,
            items: Vec::new(),
        }
    }

    pub fn capacity_seconds(&self) -> u64 {
        self.capacity_seconds
    }

    /// Sum of all track durations, recomputed on every call.
    pub fn total_seconds(&self) -> f64 {
        self.items.iter().map(|t| t.duration).sum()
    }

    pub fn items(&self) -> &[Track] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&mut self, track: Track) {
        self.items.push(track);
    }

    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let index = self.items.iter().position(|t| t.id == id)?;
        Some(self.items.remove(index))
    }

    /// Empties the playlist and hands back the removed tracks so the caller
    /// can unlink their files.
    pub fn clear(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.items)
    }

    /// Reorders to `order`, which must be a permutation of the current ids.
    /// Nothing changes when it is not.
    pub fn reorder(&mut self, order: &[String]) -> Result<(), ReorderError> {
        if order.len() != self.items.len() {
            return Err(ReorderError::LengthMismatch {
                expected: self.items.len(),
                got: order.len(),
            });
        }

        let mut seen = HashSet::with_capacity(order.len());
        for id in order {
            if !seen.insert(id.as_str()) {
                return Err(ReorderError::Duplicate(id.clone()));
            }
            if !self.items.iter().any(|t| &t.id == id) {
                return Err(ReorderError::Unknown(id.clone()));
            }
        }

        let mut remaining = std::mem::take(&mut self.items);
        for id in order {
            if let Some(index) = remaining.iter().position(|t| &t.id == id) {
                self.items.push(remaining.swap_remove(index));
            }
        }
        Ok(())
    }
}

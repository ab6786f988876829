//! cdmix - session-scoped audio CD builder
//!
//! Paste a video link, probe it for audio formats, and either collect the
//! audio into an 80-minute playlist or grab a one-off MP3/WAV conversion.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, subprocess runner, tool locator
//! - `download`: metadata probing, format selection, extraction and transcoding
//! - `session`: identity, per-session contexts, playlists and download tokens
//! - `jobs`: add/cancel/progress orchestration, conversions and exports
//! - `web`: axum router, handlers and background maintenance
//! - `cli`: command-line entry points

pub mod cli;
pub mod core;
pub mod download;
pub mod jobs;
pub mod session;
pub mod web;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use session::{SessionManager, SessionSettings};
pub use web::{build_router, AppState, ServerSettings};

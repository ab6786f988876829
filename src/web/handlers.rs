//! HTTP handlers. Each one resolves the caller's context, delegates to the
//! orchestration layer, and shapes the JSON the front end expects.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::core::error::{AppError, AppResult};
use crate::core::utils::{random_id, remove_file_quietly};
use crate::core::validation::{canonicalize_url, ConvertTarget};
use crate::download::probe::{ProbeMode, ProbeResult};
use crate::jobs::{AddOutcome, AddRequest, Delivery, ProgressSnapshot};
use crate::session::playlist::PlaylistStore;
use crate::web::session::{Identity, RebindSession, SessionCtx};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProbeBody {
    pub url: String,
    #[serde(default)]
    pub fast: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddBody {
    pub url: String,
    pub format_id: Option<String>,
    pub client_token: Option<String>,
    pub used_client: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderBody {
    pub order: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    pub url: String,
    pub target: String,
    pub format_id: Option<String>,
}

fn totals(playlist: &PlaylistStore) -> Value {
    json!({
        "ok": true,
        "totalSeconds": playlist.total_seconds(),
        "capSeconds": playlist.capacity_seconds(),
    })
}

/// Runs a job on its own task so a dropped connection does not abort it
/// halfway through its cleanup.
async fn detached<T, F>(job: F) -> AppResult<T>
where
    T: Send + 'static,
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
{
    tokio::spawn(job)
        .await
        .map_err(|e| AppError::Anyhow(anyhow::Error::new(e).context("job task panicked")))?
}

pub async fn probe(State(state): State<AppState>, Json(body): Json<ProbeBody>) -> AppResult<Json<ProbeResult>> {
    let canonical = canonicalize_url(&body.url)?;
    let mode = ProbeMode::from_fast_flag(body.fast);
    let result = state.prober.probe(&canonical.url, mode).await?;
    Ok(Json(result))
}

pub async fn add(
    State(state): State<AppState>,
    SessionCtx(ctx): SessionCtx,
    Json(body): Json<AddBody>,
) -> AppResult<Json<Value>> {
    let canonical = canonicalize_url(&body.url)?;
    let client_token = body
        .client_token
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| random_id(16));

    let request = AddRequest {
        url: canonical.url,
        video_id: canonical.video_id,
        format_id: body.format_id.filter(|f| !f.trim().is_empty()),
        client: body.used_client,
        client_token: client_token.clone(),
    };

    let adds = state.adds.clone();
    let job_ctx = Arc::clone(&ctx);
    let outcome = detached(async move { adds.add(&job_ctx, request).await }).await?;

    match outcome {
        AddOutcome::Canceled => Ok(Json(json!({ "canceled": true, "client_token": client_token }))),
        AddOutcome::Added(item) => {
            let playlist = ctx.playlist.lock().await;
            Ok(Json(json!({
                "item": item,
                "totalSeconds": playlist.total_seconds(),
                "capSeconds": playlist.capacity_seconds(),
                "client_token": client_token,
            })))
        }
    }
}

pub async fn cancel_add(
    State(state): State<AppState>,
    SessionCtx(ctx): SessionCtx,
    Json(body): Json<CancelBody>,
) -> StatusCode {
    if !body.token.trim().is_empty() {
        state.adds.cancel(&ctx, &body.token).await;
        log::info!("Cancel requested for add {} (session {})", body.token, ctx.key());
    }
    StatusCode::NO_CONTENT
}

/// Never creates a session: unknown callers just get the neutral snapshot.
pub async fn add_progress(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(token): Path<String>,
) -> Json<ProgressSnapshot> {
    let snapshot = match state.sessions.get(&identity.id).await {
        Some(ctx) => state.adds.progress(&ctx, &token).await,
        None => ProgressSnapshot::unknown(),
    };
    Json(snapshot)
}

pub async fn list(SessionCtx(ctx): SessionCtx) -> Json<Value> {
    let playlist = ctx.playlist.lock().await;
    Json(json!({
        "capSeconds": playlist.capacity_seconds(),
        "totalSeconds": playlist.total_seconds(),
        "items": playlist.items(),
    }))
}

pub async fn remove(SessionCtx(ctx): SessionCtx, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let (removed, body) = {
        let mut playlist = ctx.playlist.lock().await;
        let removed = playlist
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("no playlist item {}", id)))?;
        (removed, totals(&playlist))
    };
    remove_file_quietly(&removed.path).await;
    log::info!("Removed '{}' from session {}", removed.title, ctx.key());
    Ok(Json(body))
}

pub async fn reorder(SessionCtx(ctx): SessionCtx, Json(body): Json<ReorderBody>) -> AppResult<Json<Value>> {
    let mut playlist = ctx.playlist.lock().await;
    playlist.reorder(&body.order)?;
    Ok(Json(totals(&playlist)))
}

pub async fn clear(SessionCtx(ctx): SessionCtx) -> Json<Value> {
    let (removed, body) = {
        let mut playlist = ctx.playlist.lock().await;
        let removed = playlist.clear();
        (removed, totals(&playlist))
    };
    for track in &removed {
        remove_file_quietly(&track.path).await;
    }
    log::info!("Cleared {} track(s) from session {}", removed.len(), ctx.key());
    Json(body)
}

pub async fn convert(
    State(state): State<AppState>,
    SessionCtx(ctx): SessionCtx,
    Json(body): Json<ConvertBody>,
) -> AppResult<Json<Delivery>> {
    let canonical = canonicalize_url(&body.url)?;
    let target = ConvertTarget::parse(&body.target)?;
    let converts = state.converts.clone();
    let delivery = detached(async move { converts.convert(&ctx, &canonical, target, body.format_id).await }).await?;
    Ok(Json(delivery))
}

pub async fn export(State(state): State<AppState>, SessionCtx(ctx): SessionCtx) -> AppResult<Json<Delivery>> {
    let converts = state.converts.clone();
    let delivery = detached(async move { converts.export(&ctx).await }).await?;
    Ok(Json(delivery))
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// `attachment` disposition with an ASCII fallback and the RFC 5987 form.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Streams a prepared file. The token is consumed once the body has been
/// read to the end; an interrupted transfer leaves it for a retry.
pub async fn download(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let redemption = state.tokens.redeem(&token).await?;
    let file = match tokio::fs::File::open(&redemption.path).await {
        Ok(file) => file,
        Err(e) => {
            state.tokens.revoke(&token).await;
            return Err(AppError::NotFound(format!("file is no longer available: {}", e)));
        }
    };
    log::info!("Serving {} ({} bytes)", redemption.filename, redemption.size_bytes);

    let tokens = Arc::clone(&state.tokens);
    let finished = stream::once(async move { tokens.complete(&token).await })
        .filter_map(|()| future::ready(None::<std::io::Result<Bytes>>));
    let body = Body::from_stream(ReaderStream::new(file).chain(finished));

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&redemption.filename)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(redemption.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&redemption.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if redemption.owner_id != identity.id {
        if let Some(owner) = state.sessions.get(&redemption.owner_id).await {
            owner.touch();
            log::info!("Rebinding caller to session {}", owner.key());
            response.extensions_mut().insert(RebindSession(redemption.owner_id));
        }
    }

    Ok(response)
}

pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_keeps_ascii_and_encodes_utf8() {
        let value = content_disposition("Café \"Live\".mp3");
        assert_eq!(
            value,
            "attachment; filename=\"Caf_ _Live_.mp3\"; filename*=UTF-8''Caf%C3%A9%20%22Live%22.mp3"
        );
    }

    #[test]
    fn test_content_type_for_known_extensions() {
        assert_eq!(content_type_for("a.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("a.wav"), "audio/wav");
        assert_eq!(content_type_for("cd.zip"), "application/zip");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}

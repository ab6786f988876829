//! Session binding for HTTP requests.
//!
//! `session_layer` resolves the caller's identity once per request and
//! echoes it back in both the cookie and the `x-session-id` header. Handlers
//! then pull the context in through the `SessionCtx` extractor, which creates
//! it lazily.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use crate::core::config;
use crate::core::error::AppError;
use crate::session::context::SessionContext;
use crate::session::identity::{is_valid_session_id, ResolvedIdentity};
use crate::web::state::AppState;

/// Placed in response extensions by a handler to move the caller onto
/// another session (download links opened in a fresh browser).
#[derive(Debug, Clone)]
pub struct RebindSession(pub String);

fn session_cookie(id: &str, state: &AppState) -> Cookie<'static> {
    Cookie::build((config::session::COOKIE_NAME, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.cookie_secure)
        .max_age(time::Duration::seconds(state.sessions.settings().idle_ttl.as_secs() as i64))
        .build()
}

pub async fn session_layer(State(state): State<AppState>, jar: CookieJar, mut request: Request, next: Next) -> Response {
    let cookie = jar.get(config::session::COOKIE_NAME).map(|c| c.value().to_string());
    let header = request
        .headers()
        .get(config::session::HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let identity = state.sessions.resolve(cookie.as_deref(), header.as_deref()).await;
    log::debug!("{} {} -> session via {:?}", request.method(), request.uri().path(), identity.source);
    if let Some(ctx) = state.sessions.get(&identity.id).await {
        ctx.touch();
    }
    request.extensions_mut().insert(identity.clone());

    let mut response = next.run(request).await;

    let id = response
        .extensions()
        .get::<RebindSession>()
        .map(|rebind| rebind.0.clone())
        .filter(|id| is_valid_session_id(id))
        .unwrap_or(identity.id);

    let cookie = session_cookie(&id, &state).to_string();
    match (HeaderValue::from_str(&cookie), HeaderValue::from_str(&id)) {
        (Ok(cookie), Ok(id)) => {
            let headers = response.headers_mut();
            headers.append(SET_COOKIE, cookie);
            headers.insert(config::session::HEADER_NAME, id);
        }
        _ => log::warn!("Session identifier is not a valid header value"),
    }
    response
}

/// Identity resolved by `session_layer`, without touching storage.
#[derive(Debug, Clone)]
pub struct Identity(pub ResolvedIdentity);

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedIdentity>()
            .cloned()
            .map(Identity)
            .ok_or_else(|| AppError::Session("request reached a handler without a session".to_string()))
    }
}

/// The caller's session context, created on first use.
#[derive(Debug, Clone)]
pub struct SessionCtx(pub Arc<SessionContext>);

impl FromRequestParts<AppState> for SessionCtx {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Identity(identity) = Identity::from_request_parts(parts, state).await?;
        let ctx = state.sessions.get_or_create(&identity.id).await?;
        Ok(SessionCtx(ctx))
    }
}

//! Which session a request belongs to.
//!
//! Precedence, highest first:
//! 1. a header hint naming a session that already exists (or is being created)
//! 2. the session cookie
//! 3. a header hint for a session nobody has yet, when no cookie is present
//! 4. a freshly minted identifier
//!
//! Header hints are unauthenticated, so they only override a cookie when they
//! point at a known session. An unknown hint is adopted only when the caller
//! has no cookie, i.e. there is no existing session to take over.

use crate::core::utils::random_id;

const MIN_ID_LEN: usize = 16;
const MAX_ID_LEN: usize = 128;
const MINTED_ID_LEN: usize = 32;

/// Where the resolved identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    KnownHeader,
    Cookie,
    NewHeader,
    Minted,
}

/// Identifier plus provenance; the middleware stores it in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub id: String,
    pub source: IdentitySource,
}

pub fn is_valid_session_id(id: &str) -> bool {
    (MIN_ID_LEN..=MAX_ID_LEN).contains(&id.len())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn mint_session_id() -> String {
    random_id(MINTED_ID_LEN)
}

/// Applies the precedence above. Malformed values are ignored outright.
pub fn resolve_identity(cookie: Option<&str>, header: Option<&str>, header_is_known: bool) -> ResolvedIdentity {
    let cookie = cookie.map(str::trim).filter(|c| is_valid_session_id(c));
    let header = header.map(str::trim).filter(|h| is_valid_session_id(h));

    match (cookie, header) {
        (_, Some(h)) if header_is_known => ResolvedIdentity {
            id: h.to_string(),
            source: IdentitySource::KnownHeader,
        },
        (Some(c), _) => ResolvedIdentity {
            id: c.to_string(),
            source: IdentitySource::Cookie,
        },
        (None, Some(h)) => ResolvedIdentity {
            id: h.to_string(),
            source: IdentitySource::NewHeader,
        },
        (None, None) => ResolvedIdentity {
            id: mint_session_id(),
            source: IdentitySource::Minted,
        },
    }
}

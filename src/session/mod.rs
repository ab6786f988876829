//! Session-scoped state: identity, contexts, playlists and download tokens

pub mod context;
pub mod identity;
pub mod manager;
pub mod playlist;
pub mod tokens;

pub use context::{JobGuard, SessionContext, SessionDirs};
pub use identity::{IdentitySource, ResolvedIdentity};
pub use manager::{SessionManager, SessionSettings};
pub use playlist::{PlaylistStore, Track};
pub use tokens::{DownloadTokenIssuer, Redemption, TokenSettings};

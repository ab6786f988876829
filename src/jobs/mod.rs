//! Long-running jobs: playlist adds, one-off conversions, exports, and
//! the progress/cancel tables that track them

pub mod add;
pub mod cancel;
pub mod convert;
pub mod progress;
pub mod ttl;

use std::fmt;

pub use add::{AddOrchestrator, AddOutcome, AddRequest};
pub use cancel::CancelRegistry;
pub use convert::{ConvertOrchestrator, Delivery};
pub use progress::{ProgressSnapshot, ProgressTable};

/// Client-chosen job token scoped to the session that chose it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Filesystem key of the owning session
    pub session: String,
    pub token: String,
}

impl JobKey {
    pub fn new(session: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            token: token.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.session.get(..8).unwrap_or(&self.session);
        write!(f, "{}@{}", self.token, short)
    }
}

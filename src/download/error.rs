use thiserror::Error;

use crate::core::utils::truncate_tail_utf8;
use crate::download::failure::FailureKind;

/// Upper bound on stderr bytes echoed back to HTTP callers
const MAX_DETAIL_BYTES: usize = 4000;

/// Why a metadata probe produced no usable result.
///
/// None of these are fatal to the process: handlers surface them as 422
/// responses carrying the raw diagnostics.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    /// Extractor exited non-zero
    #[error("extractor exited with {exit_code:?}")]
    Failed { exit_code: Option<i32>, stderr: String },

    /// Extractor exited zero but stdout was not a metadata document
    #[error("could not parse extractor output: {0}")]
    ParseFailed(String),

    /// Extractor could not be started
    #[error("could not start extractor: {0}")]
    Spawn(String),

    /// Extractor did not finish in time
    #[error("extractor timed out after {0}s")]
    Timeout(u64),
}

impl ProbeError {
    /// Exit code reported by the extractor, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProbeError::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Diagnostic text for the caller: tail of stderr, or the failure description.
    pub fn detail(&self) -> String {
        match self {
            ProbeError::Failed { stderr, .. } if !stderr.trim().is_empty() => {
                truncate_tail_utf8(stderr.trim(), MAX_DETAIL_BYTES)
            }
            ProbeError::ParseFailed(detail) | ProbeError::Spawn(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Classification of the extractor's stderr, for logging.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Failed { stderr, .. } => FailureKind::classify(stderr),
            ProbeError::Timeout(_) => FailureKind::Network,
            _ => FailureKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_detail_is_stderr() {
        let err = ProbeError::Failed {
            exit_code: Some(1),
            stderr: "ERROR: [youtube] abc: Video unavailable\n".into(),
        };
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.detail(), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(err.kind(), FailureKind::Unavailable);
    }

    #[test]
    fn test_failed_without_stderr_falls_back_to_display() {
        let err = ProbeError::Failed {
            exit_code: None,
            stderr: String::new(),
        };
        assert_eq!(err.detail(), "extractor exited with None");
    }

    #[test]
    fn test_parse_failed_has_no_exit_code() {
        let err = ProbeError::ParseFailed("expected value at line 1".into());
        assert_eq!(err.exit_code(), None);
        assert_eq!(err.detail(), "expected value at line 1");
    }
}

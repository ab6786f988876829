//! Classification of extractor stderr into the few outcomes a caller can
//! act on.

/// What a failed extractor run most likely ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Sign-in wall, stale cookies, or a 403 from the source
    Blocked,
    /// Private, removed or region-locked media
    Unavailable,
    /// Timeouts and connection failures
    Network,
    Other,
}

/// Checked in order; the first kind with a matching needle wins.
const PATTERNS: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::Blocked,
        &[
            "sign in to confirm",
            "cookies are no longer valid",
            "cookies have likely been rotated",
            "use --cookies",
            "http error 403",
            "signature extraction failed",
        ],
    ),
    (
        FailureKind::Unavailable,
        &[
            "private video",
            "video unavailable",
            "is not available",
            "has been removed",
            "does not exist",
        ],
    ),
    (
        FailureKind::Network,
        &[
            "timed out",
            "connection reset",
            "connection refused",
            "failed to connect",
            "name resolution",
            "network is unreachable",
        ],
    ),
];

impl FailureKind {
    pub fn classify(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
            .map_or(FailureKind::Other, |(kind, _)| *kind)
    }

    /// Caller-facing sentence placed next to the raw stderr.
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::Blocked => "The source refused the request. Try another video or retry later.",
            FailureKind::Unavailable => "The video is unavailable. It may be private, removed, or region-locked.",
            FailureKind::Network => "Network problem while talking to the source. Try again in a minute.",
            FailureKind::Other => "Could not fetch the audio. Check that the link is correct.",
        }
    }

    pub fn operator_hint(self) -> &'static str {
        match self {
            FailureKind::Blocked => {
                "refresh YTDL_COOKIES_FILE, update yt-dlp, or pin another identity with YTDL_PLAYER_CLIENT"
            }
            FailureKind::Unavailable => "nothing to fix on this side",
            FailureKind::Network => "check outbound connectivity to the source",
            FailureKind::Other => "inspect the captured stderr and make sure yt-dlp is current",
        }
    }

    /// Only blocked and unclassified runs point at something the operator can fix.
    fn needs_operator(self) -> bool {
        matches!(self, FailureKind::Blocked | FailureKind::Other)
    }
}

/// Classifies and logs one failed run; `context` names the failed run.
pub fn log_failure(context: &str, stderr: &str) -> FailureKind {
    let kind = FailureKind::classify(stderr);
    if kind.needs_operator() {
        log::error!("{}: {:?} ({})", context, kind, kind.operator_hint());
    } else {
        log::warn!("{}: {:?}", context, kind);
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_wall_and_forbidden_are_blocked() {
        let sign_in = "ERROR: [youtube] abc: Sign in to confirm you're not a bot. Use --cookies-from-browser";
        assert_eq!(FailureKind::classify(sign_in), FailureKind::Blocked);
        assert_eq!(
            FailureKind::classify("ERROR: unable to download video data: HTTP Error 403: Forbidden"),
            FailureKind::Blocked
        );
    }

    #[test]
    fn test_private_video_is_unavailable() {
        assert_eq!(
            FailureKind::classify("ERROR: [youtube] xyz: Private video"),
            FailureKind::Unavailable
        );
    }

    #[test]
    fn test_read_timeout_is_network() {
        assert_eq!(FailureKind::classify("ERROR: Read timed out."), FailureKind::Network);
    }

    #[test]
    fn test_unmatched_stderr_is_other() {
        let kind = log_failure("job x", "something odd");
        assert_eq!(kind, FailureKind::Other);
        assert!(!kind.message().is_empty());
    }
}

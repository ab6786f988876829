//! URL validation and canonicalisation
//!
//! Every URL is validated here before any subprocess is spawned:
//! - Only HTTP/HTTPS schemes with a host are accepted
//! - YouTube short/mobile/music/shorts/embed variants collapse to one
//!   canonical watch URL so caching and dedupe see a single form

use thiserror::Error;
use url::Url;

use crate::core::config;
use crate::core::error::AppError;

/// Validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Unparseable URL, wrong scheme, or missing host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL exceeds the configured maximum length
    #[error("URL is too long ({0} bytes)")]
    TooLong(usize),

    /// Conversion target other than mp3/wav
    #[error("Unsupported target format: {0}")]
    InvalidTarget(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// A validated URL plus the video id when the host is YouTube.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalUrl {
    pub url: Url,
    pub video_id: Option<String>,
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

/// YouTube ids are exactly 11 chars of `[A-Za-z0-9_-]`.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Pulls the video id out of any known YouTube URL shape.
pub fn extract_youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    if !is_youtube_host(&host) {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("shorts") | Some("embed") | Some("live") | Some("v") => segments.next().map(str::to_string),
            _ => None,
        }
    };

    candidate.filter(|id| is_valid_video_id(id))
}

/// Validates and canonicalises a user-supplied URL.
///
/// # Examples
/// ```
/// use cdmix::core::validation::canonicalize_url;
///
/// let canonical = canonicalize_url("https://youtu.be/dQw4w9WgXcQ?t=42").unwrap();
/// assert_eq!(canonical.url.as_str(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
/// assert_eq!(canonical.video_id.as_deref(), Some("dQw4w9WgXcQ"));
///
/// assert!(canonicalize_url("ftp://example.com/a.mp3").is_err());
/// ```
pub fn canonicalize_url(raw: &str) -> Result<CanonicalUrl, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.len() > config::validation::MAX_URL_LENGTH {
        return Err(ValidationError::TooLong(trimmed.len()));
    }

    let mut parsed = Url::parse(trimmed).map_err(|_| ValidationError::InvalidUrl(trimmed.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidUrl(format!(
            "{} (invalid scheme: {})",
            trimmed,
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl(format!("{} (no host)", trimmed)));
    }

    if let Some(id) = extract_youtube_id(&parsed) {
        let canonical = Url::parse(&format!("https://www.youtube.com/watch?v={}", id))
            .map_err(|_| ValidationError::InvalidUrl(trimmed.to_string()))?;
        return Ok(CanonicalUrl {
            url: canonical,
            video_id: Some(id),
        });
    }

    parsed.set_fragment(None);
    Ok(CanonicalUrl {
        url: parsed,
        video_id: None,
    })
}

/// Audio containers a one-off conversion can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertTarget {
    Mp3,
    Wav,
}

impl ConvertTarget {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            other => Err(ValidationError::InvalidTarget(other.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    #[test]
    fn test_canonicalize_youtube_variants() {
        let variants = [
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL123&index=2",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&feature=share",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "http://youtube.com/live/dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];
        for variant in variants {
            let canonical = canonicalize_url(variant).unwrap();
            assert_eq!(canonical.url.as_str(), CANONICAL, "variant {}", variant);
            assert_eq!(canonical.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        }
    }

    #[test]
    fn test_non_youtube_urls_pass_through_without_fragment() {
        let canonical = canonicalize_url("https://soundcloud.com/artist/track#t=10").unwrap();
        assert_eq!(canonical.url.as_str(), "https://soundcloud.com/artist/track");
        assert_eq!(canonical.video_id, None);
    }

    #[test]
    fn test_invalid_urls_rejected() {
        assert!(canonicalize_url("not a url").is_err());
        assert!(canonicalize_url("ftp://youtube.com/watch?v=dQw4w9WgXcQ").is_err());
        assert!(canonicalize_url("file:///etc/passwd").is_err());
        let long = format!("https://example.com/{}", "a".repeat(3000));
        assert!(matches!(canonicalize_url(&long), Err(ValidationError::TooLong(_))));
    }

    #[test]
    fn test_youtube_url_with_bad_id_is_not_canonicalised() {
        let canonical = canonicalize_url("https://www.youtube.com/watch?v=short").unwrap();
        assert_eq!(canonical.video_id, None);
    }

    #[test]
    fn test_convert_target_parse() {
        assert_eq!(ConvertTarget::parse("MP3").unwrap(), ConvertTarget::Mp3);
        assert_eq!(ConvertTarget::parse("wav").unwrap().extension(), "wav");
        assert!(ConvertTarget::parse("flac").is_err());
    }
}

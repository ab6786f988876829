use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Escapes characters that are unsafe in file names.
///
/// Path separators, Windows-reserved characters and control characters
/// become `_`, double quotes become single quotes, and leading/trailing
/// whitespace and dots are stripped.
///
/// # Example
///
/// ```
/// use cdmix::core::utils::escape_filename;
///
/// let safe = escape_filename("song/name*.mp3");
/// assert_eq!(safe, "song_name_.mp3");
/// ```
pub fn escape_filename(filename: &str) -> String {
    let mut result = String::with_capacity(filename.len());

    for c in filename.chars() {
        match c {
            '/' | '\\' => result.push('_'),
            ':' | '*' | '?' | '<' | '>' | '|' => result.push('_'),
            '"' => result.push('\''),
            c if c.is_control() => result.push('_'),
            _ => result.push(c),
        }
    }

    let result = result.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if result.is_empty() {
        "unnamed".to_string()
    } else {
        result.to_string()
    }
}

/// Truncates text to its last `max_bytes` bytes on a UTF-8 boundary,
/// prefixing an ellipsis when anything was cut.
pub fn truncate_tail_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…\n{}", &text[start..])
}

/// Random alphanumeric identifier of the given length.
pub fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Stable filesystem-safe key for an identifier (first 32 hex chars of its SHA-256).
pub fn fs_key(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Removes a file, logging instead of failing. Returns whether it was removed.
pub async fn remove_file_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Recursively removes a directory, logging instead of failing.
pub async fn remove_dir_quietly(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}

//! Playlist export: numbered copies of every track bundled into one zip.

use std::path::{Path, PathBuf};

use crate::core::config;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, ToolCommand};
use crate::core::utils::{escape_filename, remove_dir_quietly, remove_file_quietly, truncate_tail_utf8};

/// One file to put in the bundle.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub title: String,
    pub path: PathBuf,
}

/// `"03 - Title.mp3"`: position first so archive order matches playlist order.
pub fn numbered_name(position: usize, total: usize, title: &str, path: &Path) -> String {
    let width = total.to_string().len().max(2);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
    format!("{:0width$} - {}.{}", position, escape_filename(title), ext, width = width)
}

async fn stage(entry: &ExportEntry, staged: &Path) -> std::io::Result<()> {
    if tokio::fs::hard_link(&entry.path, staged).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(&entry.path, staged).await.map(|_| ())
}

/// Bundles `entries` into `output` using the archiver. Returns the archive size.
pub async fn bundle(zip: &ToolCommand, entries: &[ExportEntry], staging_dir: &Path, output: &Path) -> Result<u64, AppError> {
    if entries.is_empty() {
        return Err(AppError::Validation("playlist is empty".to_string()));
    }

    tokio::fs::create_dir_all(staging_dir).await?;
    let result = bundle_staged(zip, entries, staging_dir, output).await;
    remove_dir_quietly(staging_dir).await;
    if result.is_err() {
        remove_file_quietly(output).await;
    }
    result
}

async fn bundle_staged(
    zip: &ToolCommand,
    entries: &[ExportEntry],
    staging_dir: &Path,
    output: &Path,
) -> Result<u64, AppError> {
    let mut args = vec!["-j".to_string(), "-q".to_string(), output.to_string_lossy().into_owned()];
    for (index, entry) in entries.iter().enumerate() {
        let staged = staging_dir.join(numbered_name(index + 1, entries.len(), &entry.title, &entry.path));
        stage(entry, &staged).await?;
        args.push(staged.to_string_lossy().into_owned());
    }

    log::info!("Bundling {} track(s) into {}", entries.len(), output.display());
    let out = run_with_timeout(zip, &args, config::download::transcode_timeout()).await?;
    if !out.success() {
        return Err(AppError::Job {
            message: format!("archiver exited with {:?}", out.exit_code),
            stderr: truncate_tail_utf8(&out.stderr, 4000),
        });
    }

    Ok(tokio::fs::metadata(output).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_name() {
        assert_eq!(
            numbered_name(3, 12, "Artist/Title", Path::new("/t/a.mp3")),
            "03 - Artist_Title.mp3"
        );
        assert_eq!(numbered_name(7, 120, "x", Path::new("/t/a.mp3")), "007 - x.mp3");
    }

    #[tokio::test]
    async fn test_bundle_rejects_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let result = bundle(
            &ToolCommand::new("zip"),
            &[],
            &dir.path().join("stage"),
            &dir.path().join("out.zip"),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bundle_stages_numbered_files_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("a1.mp3");
        std::fs::write(&track, b"audio").unwrap();
        let staging = dir.path().join("stage");
        let output = dir.path().join("out.zip");

        // Stand-in archiver: `$3` is the archive path, `$4` the first input.
        let fake_zip = ToolCommand::with_prefix("sh", &["-c", "cat \"$4\" > \"$3\"", "zip"]);
        let entries = vec![ExportEntry {
            title: "First".into(),
            path: track.clone(),
        }];
        let size = bundle(&fake_zip, &entries, &staging, &output).await.unwrap();

        assert_eq!(size, 5);
        assert!(!staging.exists());
        assert!(track.exists());
    }
}

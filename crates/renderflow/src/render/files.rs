use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use rand::Rng;

pub async fn init_temp_dir(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating temp dir {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "temp dir ready");
    Ok(())
}

/// `render-<unix ms>-<8 hex>.mp4` inside `dir`.
pub fn temp_video_path(dir: &Path) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen();
    dir.join(format!("render-{millis}-{suffix:08x}.mp4"))
}

/// Best available "is there room to write" check: the directory exists and is a directory.
pub async fn temp_dir_usable(dir: &Path) -> bool {
    match tokio::fs::metadata(dir).await {
        Ok(meta) => meta.is_dir(),
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "temp dir not accessible");
            false
        }
    }
}

/// Remove a temp file. A file that is already gone is not an error.
pub async fn delete_temp_file(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "temp file deleted");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
    }
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
///
/// Per-file failures are logged and skipped. Returns number deleted.
pub async fn cleanup_old_files(dir: &Path, max_age: Duration) -> anyhow::Result<usize> {
    let now = SystemTime::now();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading {}", dir.display()))?;

    let mut deleted = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping temp entry");
                continue;
            }
        };

        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete old temp file"),
        }
    }

    Ok(deleted)
}

/// Accepts a bare file name (no separators, no `..`) and resolves it inside `dir`.
pub fn resolve_in_dir(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let valid = !file_name.is_empty()
        && !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    valid.then(|| dir.join(file_name))
}

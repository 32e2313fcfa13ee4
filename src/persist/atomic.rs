//! Crash-safe file replacement.
//!
//! A write goes through four steps:
//! ```text
//! stage           data     → <path>_temp_<ts>.new
//! retire_current  <path>   → <path>_temp_<ts>.old   (missing target is fine)
//! commit          .new     → <path>                 (restores .old on failure)
//! cleanup         remove .old                       (missing is fine)
//! ```
//! Interrupted before `retire_current`, the target is untouched. Interrupted
//! between `retire_current` and `commit`, the previous content sits in the
//! `.old` sibling and [`recover_interrupted`] puts it back. The same call
//! removes temp files left by any other interruption.

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;

const TEMP_MARKER: &str = "_temp_";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// One in-flight atomic replacement of `target`.
#[derive(Debug, Clone)]
pub struct AtomicWrite {
    target: PathBuf,
    staged: PathBuf,
    retired: PathBuf,
}

impl AtomicWrite {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self::with_timestamp(target, Utc::now())
    }

    pub fn with_timestamp(target: impl Into<PathBuf>, at: DateTime<Utc>) -> Self {
        let target = target.into();
        let mut base: OsString = target.as_os_str().to_owned();
        base.push(TEMP_MARKER);
        base.push(at.format(TIMESTAMP_FORMAT).to_string());

        let mut staged = base.clone();
        staged.push(".new");
        let mut retired = base;
        retired.push(".old");

        Self {
            target,
            staged: PathBuf::from(staged),
            retired: PathBuf::from(retired),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    pub fn retired_path(&self) -> &Path {
        &self.retired
    }

    /// Write the new content next to the target.
    pub async fn stage(&self, data: &[u8]) -> io::Result<()> {
        fs::write(&self.staged, data).await
    }

    /// Move the current target aside.
    pub async fn retire_current(&self) -> io::Result<()> {
        match fs::rename(&self.target, &self.retired).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&self.staged).await;
                Err(e)
            }
        }
    }

    /// Move the staged file onto the target.
    pub async fn commit(&self) -> io::Result<()> {
        if let Err(e) = fs::rename(&self.staged, &self.target).await {
            if let Err(restore) = fs::rename(&self.retired, &self.target).await {
                if restore.kind() != ErrorKind::NotFound {
                    tracing::error!(
                        path = %self.target.display(),
                        error = %restore,
                        "Failed to restore previous file after aborted commit"
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Drop the retired copy.
    pub async fn cleanup(&self) -> io::Result<()> {
        match fs::remove_file(&self.retired).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Run every step.
    pub async fn run(&self, data: &[u8]) -> io::Result<()> {
        self.stage(data).await?;
        self.retire_current().await?;
        self.commit().await?;
        self.cleanup().await
    }
}

/// Replace `path` with `data` so that readers only ever see a complete file.
pub async fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> io::Result<()> {
    AtomicWrite::new(path.as_ref()).run(data).await
}

/// Put `path` back in order after a write was interrupted.
///
/// If `path` is missing, the newest retired `.old` sibling is moved back.
/// Once the target exists, every other `<name>_temp_*` sibling is stale and
/// removed. Returns whether a file was restored.
pub async fn recover_interrupted(path: impl AsRef<Path>) -> io::Result<bool> {
    let path = path.as_ref();
    let (dir, name) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => (dir, name.to_string_lossy().into_owned()),
        _ => return Ok(false),
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    let mut leftovers = temp_siblings(dir, &name).await?;
    let mut restored = false;
    if !fs::try_exists(path).await? {
        match leftovers.iter().rposition(|n| n.ends_with(".old")) {
            Some(pos) => {
                let old = leftovers.remove(pos);
                fs::rename(dir.join(&old), path).await?;
                tracing::warn!(path = %path.display(), from = %old, "Recovered file from interrupted write");
                restored = true;
            }
            // A lone .new may be half written; leave it for inspection.
            None => return Ok(false),
        }
    }

    for stale in leftovers {
        match fs::remove_file(dir.join(&stale)).await {
            Ok(()) => tracing::debug!(path = %path.display(), file = %stale, "Removed stale temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file = %stale, error = %e, "Failed to remove stale temp file"),
        }
    }
    Ok(restored)
}

/// Names of `<name>_temp_*` entries in `dir`, oldest first.
async fn temp_siblings(dir: &Path, name: &str) -> io::Result<Vec<String>> {
    let prefix = format!("{}{}", name, TEMP_MARKER);
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let candidate = entry.file_name().to_string_lossy().into_owned();
        if candidate.starts_with(&prefix) {
            found.push(candidate);
        }
    }
    // Timestamps sort lexicographically.
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_temp_naming() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let write = AtomicWrite::with_timestamp("/data/state.json", at);
        assert_eq!(
            write.staged_path(),
            Path::new("/data/state.json_temp_2024-03-09_07-05-01.new")
        );
        assert_eq!(
            write.retired_path(),
            Path::new("/data/state.json_temp_2024-03-09_07-05-01.old")
        );
    }

    #[tokio::test]
    async fn test_write_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"first").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // Only the target is left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_after_stage_leaves_target_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"previous").unwrap();

        let write = AtomicWrite::new(&path);
        write.stage(b"next").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
        assert_eq!(std::fs::read(write.staged_path()).unwrap(), b"next");
    }

    #[tokio::test]
    async fn test_interrupted_after_retire_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"previous").unwrap();

        let write = AtomicWrite::new(&path);
        write.stage(b"next").await.unwrap();
        write.retire_current().await.unwrap();
        assert!(!path.exists());

        assert!(recover_interrupted(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");

        // Nothing to do once the target is back.
        assert!(!recover_interrupted(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_commit_restores_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"previous").unwrap();

        let write = AtomicWrite::new(&path);
        write.stage(b"next").await.unwrap();
        write.retire_current().await.unwrap();
        // Lose the staged file so the commit rename fails.
        std::fs::remove_file(write.staged_path()).unwrap();

        assert!(write.commit().await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_recover_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(!recover_interrupted(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_temp_files_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"current").unwrap();

        let early = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        // Crash before the first rename.
        let staged_only = AtomicWrite::with_timestamp(&path, early);
        std::fs::write(staged_only.staged_path(), b"partial").unwrap();
        // Crash between commit and cleanup.
        let committed = AtomicWrite::with_timestamp(&path, late);
        std::fs::write(committed.retired_path(), b"older").unwrap();
        std::fs::write(dir.path().join("state.json.bak"), b"unrelated").unwrap();

        assert!(!recover_interrupted(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"current");
        assert!(!staged_only.staged_path().exists());
        assert!(!committed.retired_path().exists());
        assert!(dir.path().join("state.json.bak").exists());
    }

    #[tokio::test]
    async fn test_recover_picks_newest_old_and_sweeps_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let early =
            AtomicWrite::with_timestamp(&path, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let late =
            AtomicWrite::with_timestamp(&path, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        std::fs::write(early.retired_path(), b"oldest").unwrap();
        std::fs::write(late.retired_path(), b"newest").unwrap();
        std::fs::write(late.staged_path(), b"next").unwrap();

        assert!(recover_interrupted(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"newest");
        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
    }
}

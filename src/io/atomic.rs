//! Atomic file replacement for cache and result files.
//!
//! Data is written to a unique temporary file next to the target, synced, and
//! then renamed over the target. Readers never observe a partially written
//! file. Concurrent writers of the same target both succeed; the last rename
//! wins.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AppError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `target` through `write`, replacing any existing file atomically.
pub fn write_atomic<F>(target: &Path, write: F) -> Result<(), AppError>
where
    F: FnOnce(&mut File) -> Result<(), AppError>,
{
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = unique_tmp_path(target);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        write(&mut file)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, target)?;
        Ok(())
    })();

    if result.is_err() {
        if let Err(err) = fs::remove_file(&tmp) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %err, "Failed to remove temporary file");
            }
        }
    }
    result
}

fn unique_tmp_path(target: &Path) -> PathBuf {
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("cache");
    target.with_file_name(format!(".{file_name}.tmp.{}.{counter}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        fs::write(&target, b"old").unwrap();

        write_atomic(&target, |f| {
            f.write_all(b"new")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_write_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        fs::write(&target, b"old").unwrap();

        let err = write_atomic(&target, |_| Err(AppError::Cache("boom".into())));
        assert!(err.is_err());
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

//! Grid archive retrieval and extraction.
//!
//! The Dartmouth grids ship as a master tarball (`dartmouth.tgz`) holding one
//! tarball per photometric system. Downloading uses the archive's fixed Zenodo
//! record; extraction delegates to the system `tar`.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::AppError;
use crate::io::atomic::write_atomic;

/// Unpacks a `.tgz` into a directory.
///
/// Extraction must be idempotent: re-running over an existing tree overwrites
/// files in place.
pub trait Extractor: Send + Sync {
    fn extract(&self, tarball: &Path, dest: &Path) -> Result<(), AppError>;
}

/// Runs `tar -xzf <tarball> -C <dest>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTar;

impl Extractor for SystemTar {
    fn extract(&self, tarball: &Path, dest: &Path) -> Result<(), AppError> {
        fs::create_dir_all(dest)?;
        tracing::info!(tarball = %tarball.display(), dest = %dest.display(), "Extracting archive");

        let output = Command::new("tar")
            .arg("-xzf")
            .arg(tarball)
            .arg("-C")
            .arg(dest)
            .output()
            .map_err(|e| AppError::Archive(format!("Failed to run tar: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Archive(format!(
                "tar failed for '{}' ({}): {}",
                tarball.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Blocking HTTP client for the grid archive.
pub struct ArchiveClient {
    client: Client,
}

impl ArchiveClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30 * 60))
            .build()
            .map_err(|e| AppError::Archive(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url` to `dest` (atomic replace).
    pub fn download(&self, url: &str, dest: &Path) -> Result<(), AppError> {
        tracing::info!(url, dest = %dest.display(), "Downloading grid archive");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| AppError::Archive(format!("Archive request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Archive(format!(
                "Archive request failed with status {}.",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .map_err(|e| AppError::Archive(format!("Failed to read archive body: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::Archive(format!("Archive at {url} is empty.")));
        }

        write_atomic(dest, |file| {
            file.write_all(&bytes)?;
            Ok(())
        })?;
        tracing::info!(bytes = bytes.len(), "Archive downloaded");
        Ok(())
    }
}

//! On-disk triangulation cache.
//!
//! # Format
//! ```text
//! magic     "SGTRI"   5 bytes
//! version   u32 LE
//! checksum  u64 LE    FNV-1a of the payload
//! payload   bincode(Triangulation)
//! ```
//!
//! A cache is reused only if it is not older than the grid it was built from,
//! its checksum verifies, and its point fingerprint matches the grid's.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::error::AppError;
use crate::grid::cache::is_fresh;
use crate::interp::delaunay::{Triangulation, fingerprint};
use crate::io::atomic::write_atomic;

const MAGIC: &[u8; 5] = b"SGTRI";
const FORMAT_VERSION: u32 = 2;

/// 64-bit FNV-1a.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ b as u64).wrapping_mul(PRIME))
}

pub fn save_triangulation(path: &Path, tri: &Triangulation) -> Result<(), AppError> {
    let payload = bincode::serialize(tri)
        .map_err(|e| AppError::Cache(format!("Failed to serialize triangulation: {e}")))?;
    write_atomic(path, |file| {
        file.write_all(MAGIC)?;
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
        file.write_all(&fnv1a64(&payload).to_le_bytes())?;
        file.write_all(&payload)?;
        Ok(())
    })
}

pub fn load_triangulation(path: &Path) -> Result<Triangulation, AppError> {
    let mut file = File::open(path)?;
    let bad = |msg: String| AppError::Cache(format!("'{}': {msg}", path.display()));

    let mut magic = [0u8; 5];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(bad(format!("bad magic {magic:?}")));
    }

    let mut word = [0u8; 4];
    file.read_exact(&mut word)?;
    let version = u32::from_le_bytes(word);
    if version != FORMAT_VERSION {
        return Err(bad(format!("format version {version}, expected {FORMAT_VERSION}")));
    }

    let mut word = [0u8; 8];
    file.read_exact(&mut word)?;
    let expected = u64::from_le_bytes(word);

    let mut payload = Vec::new();
    file.read_to_end(&mut payload)?;
    if fnv1a64(&payload) != expected {
        return Err(bad("checksum mismatch".into()));
    }

    bincode::deserialize(&payload).map_err(|e| bad(format!("corrupt payload: {e}")))
}

/// Reuse the cached triangulation of `points` if valid, else build and
/// cache a new one.
pub fn load_or_build(
    path: &Path,
    points: &[[f64; 3]],
    source_mtime: Option<SystemTime>,
) -> Result<Triangulation, AppError> {
    if is_fresh(path, source_mtime) {
        match load_triangulation(path) {
            Ok(tri) if tri.fingerprint() == fingerprint(points) && tri.n_input() == points.len() => {
                tracing::debug!(path = %path.display(), tets = tri.n_tets(), "Triangulation cache hit");
                return Ok(tri);
            }
            Ok(_) => tracing::info!(path = %path.display(), "Triangulation cache is for another grid"),
            Err(err) => tracing::warn!(error = %err, "Ignoring unreadable triangulation cache"),
        }
    }

    tracing::info!(points = points.len(), "Triangulating grid");
    let tri = Triangulation::build(points)?;
    tracing::info!(tets = tri.n_tets(), "Triangulation complete");
    if let Err(err) = save_triangulation(path, &tri) {
        tracing::warn!(path = %path.display(), error = %err, "Failed to write triangulation cache");
    }
    Ok(tri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<[f64; 3]> {
        let mut out = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..2 {
                    out.push([0.5 + 0.1 * i as f64, 9.0 + 0.2 * j as f64, -0.5 + 0.5 * k as f64]);
                }
            }
        }
        out
    }

    #[test]
    fn fnv_matches_reference_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn saved_triangulation_loads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tri");
        let tri = Triangulation::build(&points()).unwrap();
        save_triangulation(&path, &tri).unwrap();
        assert_eq!(load_triangulation(&path).unwrap(), tri);
    }

    #[test]
    fn corrupted_cache_is_rejected_and_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tri");
        let pts = points();
        let tri = load_or_build(&path, &pts, None).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(load_triangulation(&path), Err(AppError::Cache(_))));

        let again = load_or_build(&path, &pts, None).unwrap();
        assert_eq!(again, tri);
        assert!(load_triangulation(&path).is_ok());
    }

    #[test]
    fn cache_for_other_points_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tri");
        let pts = points();
        load_or_build(&path, &pts, None).unwrap();

        let mut moved = pts.clone();
        moved[0][0] = 0.45;
        let tri = load_or_build(&path, &moved, None).unwrap();
        assert_eq!(tri.fingerprint(), fingerprint(&moved));
    }
}

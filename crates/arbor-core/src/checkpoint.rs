//! Persisting the ledger's resume point.
//!
//! The checkpoint is a small JSON file. Writers and readers take an
//! exclusive advisory lock on a sibling `<file>.lock` first, and the file
//! itself is replaced by rename so a reader never sees a partial write.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ledger::Checkpoint;
use crate::lock::FileLock;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn lock_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".lock");
    PathBuf::from(raw)
}

/// Write `checkpoint` to `path`.
///
/// # Errors
///
/// Returns an error if the lock cannot be taken in time or the file cannot
/// be written.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let _lock = FileLock::acquire(&lock_path(path), LOCK_TIMEOUT)
        .with_context(|| format!("Failed to lock checkpoint {}", path.display()))?;

    let body = serde_json::to_string_pretty(checkpoint).context("Failed to encode checkpoint")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Read a checkpoint. A missing file yields `None`.
///
/// # Errors
///
/// Returns an error if the lock cannot be taken in time or the file is
/// unreadable or malformed.
pub fn load(path: &Path) -> Result<Option<Checkpoint>> {
    if !path.exists() {
        return Ok(None);
    }
    let _lock = FileLock::acquire(&lock_path(path), LOCK_TIMEOUT)
        .with_context(|| format!("Failed to lock checkpoint {}", path.display()))?;

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let checkpoint = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(checkpoint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.json");
        let cp = Checkpoint {
            max_block: Some(42),
            accepted: 10,
            duplicates: 3,
        };
        save(&path, &cp).expect("save");
        assert_eq!(load(&path).expect("load"), Some(cp));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(load(&dir.path().join("absent.json")).expect("load"), None);
    }

    #[test]
    fn wire_form_is_camel_case() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.json");
        save(&path, &Checkpoint::default()).expect("save");
        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"maxBlock\""));
    }
}

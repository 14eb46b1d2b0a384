//! Exclusive advisory lock over a programming document (spec §5, §9:
//! "only one batch run may hold the lock for a given document at a
//! time; a second run must fail fast rather than block").
//!
//! Grounded on `fs2`'s `FileExt::try_lock_exclusive`, an OS-level
//! advisory lock that is released automatically if the holding process
//! dies, so a crashed batch never leaves a stale lock behind.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds the OS lock for as long as it is alive; dropping it releases
/// the lock (explicitly, then implicitly via file close as a backstop).
pub struct DocumentLock {
    path: PathBuf,
    file: File,
}

impl DocumentLock {
    /// Try to acquire the lock for `document_path`, failing immediately
    /// (rather than blocking) if another process already holds it.
    pub fn acquire(document_path: &Path) -> Result<Self> {
        let lock_path = lock_file_path(document_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::LockBusy(document_path.display().to_string())
        })?;
        Ok(Self {
            path: lock_path,
            file,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn lock_file_path(document_path: &Path) -> PathBuf {
    let mut name = document_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    name.push_str(".lock");
    document_path
        .parent()
        .map(|p| p.join(&name))
        .unwrap_or_else(|| PathBuf::from(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("weekday.md");
        std::fs::write(&doc, "# Weekday\n").unwrap();

        let first = DocumentLock::acquire(&doc).unwrap();
        let second = DocumentLock::acquire(&doc);
        assert!(second.is_err());
        drop(first);

        // released once the holder drops
        let third = DocumentLock::acquire(&doc);
        assert!(third.is_ok());
    }

    #[test]
    fn lock_file_is_a_sibling_of_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("sunday.md");
        std::fs::write(&doc, "# Sunday\n").unwrap();
        let lock = DocumentLock::acquire(&doc).unwrap();
        assert_eq!(lock.lock_path(), dir.path().join("sunday.md.lock"));
    }
}

//! Copy-before-delete store.
//!
//! Each category run gets its own session directory
//! `<root>/<category>/<YYYYmmdd-HHMMSS>/`; copied files are listed in a
//! JSON-lines `manifest.jsonl` with their blake3 hash. Files above the size
//! limit are not copied. That decision never blocks their deletion.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::catalog::Category;
use crate::error::BackupError;

pub const MANIFEST_NAME: &str = "manifest.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub size: u64,
    pub blake3: String,
    pub backed_up_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Copied(ManifestEntry),
    SkippedTooLarge { size: u64 },
}

pub struct BackupSession {
    dir: PathBuf,
    max_file_bytes: u64,
    seq: AtomicU64,
    manifest: Mutex<Option<File>>,
}

impl BackupSession {
    pub fn new(root: &Path, category: Category, max_file_bytes: u64) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self {
            dir: root.join(category.name()).join(stamp),
            max_file_bytes,
            seq: AtomicU64::new(0),
            manifest: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `path` into the session, unless it exceeds the size limit.
    pub fn backup(&self, path: &Path) -> Result<BackupOutcome, BackupError> {
        let size = fs::metadata(path)
            .map_err(|source| BackupError::Copy {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if size > self.max_file_bytes {
            log::debug!("not backing up {} ({size} bytes)", path.display());
            return Ok(BackupOutcome::SkippedTooLarge { size });
        }

        fs::create_dir_all(&self.dir).map_err(|source| BackupError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let dest = self.dir.join(format!("{n:06}_{name}"));

        fs::copy(path, &dest).map_err(|source| BackupError::Copy {
            path: path.to_path_buf(),
            source,
        })?;
        let hash = hash_file(&dest).map_err(|source| BackupError::Copy {
            path: dest.clone(),
            source,
        })?;

        let entry = ManifestEntry {
            original: path.to_path_buf(),
            backup: dest,
            size,
            blake3: hash.to_hex().to_string(),
            backed_up_at: crate::utils::timestamp(),
        };
        self.append(&entry)?;
        Ok(BackupOutcome::Copied(entry))
    }

    fn append(&self, entry: &ManifestEntry) -> Result<(), BackupError> {
        let line = serde_json::to_string(entry).map_err(|e| BackupError::Manifest(e.to_string()))?;
        let mut guard = self
            .manifest
            .lock()
            .map_err(|_| BackupError::Manifest("manifest lock poisoned".to_string()))?;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(MANIFEST_NAME))
                .map_err(|e| BackupError::Manifest(e.to_string()))?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            writeln!(file, "{line}").map_err(|e| BackupError::Manifest(e.to_string()))?;
        }
        Ok(())
    }
}

/// Read every entry of a session manifest.
pub fn read_manifest(session_dir: &Path) -> Result<Vec<ManifestEntry>, BackupError> {
    let text = fs::read_to_string(session_dir.join(MANIFEST_NAME))
        .map_err(|e| BackupError::Manifest(e.to_string()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| BackupError::Manifest(e.to_string())))
        .collect()
}

/// Compute blake3 hash of an entire file.
fn hash_file(path: &Path) -> std::io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_and_records_hash() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("cache.tmp");
        fs::write(&file, b"payload").unwrap();

        let session = BackupSession::new(store.path(), Category::TempFiles, 1024);
        let outcome = session.backup(&file).unwrap();
        let BackupOutcome::Copied(entry) = outcome else {
            panic!("expected a copy");
        };
        assert_eq!(fs::read(&entry.backup).unwrap(), b"payload");
        assert_eq!(entry.blake3, blake3::hash(b"payload").to_hex().to_string());
        assert!(session.dir().starts_with(store.path().join("temp-files")));

        let manifest = read_manifest(session.dir()).unwrap();
        assert_eq!(manifest, vec![entry]);
    }

    #[test]
    fn oversized_files_are_skipped() {
        let src = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = src.path().join("big.bin");
        fs::write(&file, vec![1u8; 2048]).unwrap();

        let session = BackupSession::new(store.path(), Category::TempFiles, 1024);
        assert_eq!(
            session.backup(&file).unwrap(),
            BackupOutcome::SkippedTooLarge { size: 2048 }
        );
        assert!(!session.dir().exists());
    }
}

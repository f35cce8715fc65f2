//! The last gate before a file disappears.
//!
//! Classification may be minutes old by the time a worker reaches a file, so
//! the delete path re-checks existence, protection, signs of active use and
//! permissions itself before unlinking.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crate::backup::{BackupOutcome, BackupSession};
use crate::error::DeleteError;
use crate::security::normalized;
use crate::utils;

/// Names never deleted, compared case-insensitively.
pub const PROTECTED_FILES: &[&str] = &[
    "desktop.ini",
    "thumbs.db",
    ".gitkeep",
    "important.txt",
    "readme.txt",
];

/// Extensions allowed even inside system directories.
pub const SAFE_TEMP_EXTENSIONS: &[&str] = &[
    "tmp", "temp", "log", "bak", "old", "cache", "dmp", "etl", "evtx", "manifest", "blf",
    "regtrans-ms", "cab", "chk", "gid", "fts", "ftg", "ftr", "crdownload", "partial", "download",
    "downloading", "opdownload", "oppart", "bc!", "!ut", "aria2", "torchdownload", "crx", "part",
    "!qb",
];

const SYSTEM_DIR_MARKERS: &[&str] = &["system32", "syswow64", "drivers"];

const ACTIVE_NAME_MARKERS: &[&str] = &[".lock", ".lck", ".pid", ".running", "lockfile", "lock.txt"];

/// A way of removing one file.
pub trait DeletionStrategy: Send + Sync {
    /// Remove `path`. A file that is already gone counts as removed.
    fn delete(&self, path: &Path, dry_run: bool) -> Result<(), DeleteError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Files modified more recently than this look actively used.
    pub min_age: Duration,
    pub attempts: u32,
    /// Sleep before attempt `n` (n >= 1) is `backoff * n`.
    pub backoff: Duration,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            min_age: Duration::from_secs(3600),
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Guarded unlink with retry.
#[derive(Debug, Clone, Default)]
pub struct DirectDelete {
    opts: DeleteOptions,
}

impl DirectDelete {
    pub fn new(opts: DeleteOptions) -> Self {
        Self { opts }
    }

    /// Run every pre-delete gate without deleting.
    fn check(&self, path: &Path) -> Result<Option<fs::Metadata>, DeleteError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(DeleteError::PermissionDenied(e))
            }
            Err(e) => return Err(DeleteError::Io(e)),
        };
        if is_protected(path) {
            return Err(DeleteError::Protected);
        }
        if looks_active(path, &meta, self.opts.min_age) {
            return Err(DeleteError::ActiveUse);
        }
        if !can_delete(path) {
            return Err(DeleteError::InsufficientPermissions);
        }
        Ok(Some(meta))
    }

    fn unlink_with_retry(&self, path: &Path) -> Result<(), DeleteError> {
        let attempts = self.opts.attempts.max(1);
        let mut last = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                thread::sleep(self.opts.backoff * attempt);
                let _ = clear_readonly(path);
            }
            match fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    log::trace!("attempt {} on {} failed: {e}", attempt + 1, path.display());
                    last = Some(e);
                }
            }
        }
        let err = last.unwrap_or_else(|| io::Error::other("Failed after all retries"));
        Err(if err.kind() == io::ErrorKind::PermissionDenied {
            DeleteError::PermissionDenied(err)
        } else {
            DeleteError::Io(err)
        })
    }
}

impl DeletionStrategy for DirectDelete {
    fn delete(&self, path: &Path, dry_run: bool) -> Result<(), DeleteError> {
        if dry_run {
            return Ok(());
        }
        if self.check(path)?.is_none() {
            return Ok(());
        }
        self.unlink_with_retry(path)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Copies each file into a backup session before handing it to [`DirectDelete`].
pub struct BackupThenDelete {
    direct: DirectDelete,
    session: Arc<BackupSession>,
}

impl BackupThenDelete {
    pub fn new(direct: DirectDelete, session: Arc<BackupSession>) -> Self {
        Self { direct, session }
    }
}

impl DeletionStrategy for BackupThenDelete {
    fn delete(&self, path: &Path, dry_run: bool) -> Result<(), DeleteError> {
        if dry_run {
            return Ok(());
        }
        // gate first so refused files are never copied
        if self.direct.check(path)?.is_none() {
            return Ok(());
        }
        match self.session.backup(path)? {
            BackupOutcome::Copied(entry) => {
                log::trace!("backed up {} to {}", path.display(), entry.backup.display())
            }
            BackupOutcome::SkippedTooLarge { size } => log::debug!(
                "{} too large for backup ({}), deleting anyway",
                path.display(),
                utils::format_size(size)
            ),
        }
        self.direct.unlink_with_retry(path)
    }

    fn name(&self) -> &'static str {
        "backup-then-delete"
    }
}

/// Protected by name, or sitting in a system directory without a disposable extension.
pub fn is_protected(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if PROTECTED_FILES.contains(&name.as_str()) {
        return true;
    }
    let s = normalized(path);
    if SYSTEM_DIR_MARKERS.iter().any(|m| s.contains(m)) {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        return !SAFE_TEMP_EXTENSIONS.contains(&ext.as_str());
    }
    false
}

/// Lock-like name, or modified within `min_age`.
pub fn looks_active(path: &Path, meta: &fs::Metadata, min_age: Duration) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ACTIVE_NAME_MARKERS.iter().any(|m| name.contains(m)) {
        return true;
    }
    match meta.modified() {
        Ok(mtime) => SystemTime::now()
            .duration_since(mtime)
            .map_or(true, |age| age < min_age),
        Err(_) => false,
    }
}

/// Parent must be writable; the file too, unless elevated rights can clear its read-only bit.
fn can_delete(path: &Path) -> bool {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !utils::is_writable(parent) {
        return false;
    }
    if utils::is_writable(path) {
        return true;
    }
    utils::has_elevated_rights() && clear_readonly(path).is_ok()
}

#[cfg(unix)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o200);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

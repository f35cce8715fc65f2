use std::fs;
use std::path::{Path, PathBuf};

use super::RunContext;
use crate::catalog::Category;
use crate::cleaner::{Cleaner, CleanupResult};
use crate::utils;

/// The platform's deleted-items store.
pub trait RecycleBin: Send + Sync {
    /// Top-level entries currently held.
    fn items(&self) -> Vec<PathBuf>;

    /// Bytes held, counted recursively.
    fn size(&self) -> u64 {
        self.items().iter().map(|p| utils::entry_size(p)).sum()
    }

    /// Remove every entry. `true` when nothing is left behind.
    fn empty(&self) -> bool;
}

/// Trash implemented as plain directories: entries live in `content`,
/// bookkeeping (such as freedesktop `.trashinfo` files) in `metadata`.
#[derive(Debug, Clone, Default)]
pub struct TrashDir {
    content: Vec<PathBuf>,
    metadata: Vec<PathBuf>,
}

impl TrashDir {
    pub fn new(content: Vec<PathBuf>, metadata: Vec<PathBuf>) -> Self {
        Self { content, metadata }
    }

    /// The current user's trash on this platform.
    pub fn platform() -> Self {
        if cfg!(target_os = "macos") {
            let content = utils::home_dir().map(|h| h.join(".Trash"));
            return Self::new(content.into_iter().collect(), Vec::new());
        }
        if cfg!(windows) {
            // the per-volume $Recycle.Bin needs elevated rights to clear
            return Self::default();
        }
        match dirs::data_local_dir() {
            Some(data) => {
                let trash = data.join("Trash");
                Self::new(vec![trash.join("files")], vec![trash.join("info")])
            }
            None => Self::default(),
        }
    }
}

fn entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(read_dir) => read_dir.flatten().map(|e| e.path()).collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            log::warn!("Cannot read {}: {e}", dir.display());
            Vec::new()
        }
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

impl RecycleBin for TrashDir {
    fn items(&self) -> Vec<PathBuf> {
        self.content.iter().flat_map(|d| entries(d)).collect()
    }

    fn empty(&self) -> bool {
        let mut clean = true;
        for path in self
            .content
            .iter()
            .chain(&self.metadata)
            .flat_map(|d| entries(d))
        {
            if let Err(e) = remove_entry(&path) {
                log::warn!("Failed to remove {}: {e}", path.display());
                clean = false;
            }
        }
        clean
    }
}

pub struct RecycleBinCleaner;

impl RecycleBinCleaner {
    fn measure(bin: &dyn RecycleBin) -> CleanupResult {
        CleanupResult {
            files_scanned: bin.items().len() as u64,
            bytes_freed: bin.size(),
            ..CleanupResult::new()
        }
    }
}

impl Cleaner for RecycleBinCleaner {
    fn category(&self) -> Category {
        Category::RecycleBin
    }

    fn scan(&self, ctx: &RunContext) -> CleanupResult {
        Self::measure(ctx.recycle_bin())
    }

    fn clean(&self, ctx: &RunContext) -> CleanupResult {
        let bin = ctx.recycle_bin();
        let mut result = Self::measure(bin);
        if ctx.settings.dry_run || ctx.stop.is_set() || result.files_scanned == 0 {
            return result;
        }
        if bin.empty() {
            result.files_deleted = result.files_scanned;
        } else {
            let left = Self::measure(bin);
            result.files_deleted = result.files_scanned.saturating_sub(left.files_scanned);
            result.bytes_freed = result.bytes_freed.saturating_sub(left.bytes_freed);
            result.record_error("Failed to empty recycle bin");
        }
        result
    }
}

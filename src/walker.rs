//! Bounded breadth-first directory walk.
//!
//! The walk keeps an explicit `(dir, depth)` queue, lists each directory once
//! and never raises: unreadable directories and entries are skipped.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::ProbeError;

/// Hard file cap of the bounded tier.
pub const BOUNDED_MAX_FILES: usize = 5_000;

/// Directory names never descended into (compared case-insensitively).
pub const PROTECTED_DIRS: &[&str] = &[
    "system32",
    "syswow64",
    "drivers",
    "winsxs",
    "system",
    "catroot",
    "catroot2",
    "servicing",
    "en-us",
    "fonts",
    "ime",
    "migwiz",
    "oobe",
    "setup",
    "speech",
    "twain_32",
];

pub fn is_protected_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    PROTECTED_DIRS.iter().any(|p| *p == lower)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkBudget {
    pub max_files: usize,
    pub max_depth: usize,
}

impl WalkBudget {
    pub const fn new(max_files: usize, max_depth: usize) -> Self {
        Self {
            max_files,
            max_depth,
        }
    }
}

/// A file discovered during a walk. Snapshot only; may be stale by the time
/// anything acts on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
}

impl CandidateFile {
    pub fn from_metadata(path: PathBuf, meta: &fs::Metadata) -> Self {
        Self {
            path,
            size: meta.len(),
            modified: meta.modified().ok(),
            accessed: meta.accessed().ok(),
        }
    }

    /// Stat a path into a candidate. Only regular files qualify.
    pub fn probe(path: &Path) -> Result<Self, ProbeError> {
        let meta = fs::symlink_metadata(path).map_err(|e| ProbeError::io(path, e))?;
        if !meta.is_file() {
            return Err(ProbeError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        Ok(Self::from_metadata(path.to_path_buf(), &meta))
    }
}

/// Lazy breadth-first walk. Each instance performs one fresh traversal.
pub struct TreeWalker {
    queue: VecDeque<(PathBuf, usize)>,
    ready: VecDeque<CandidateFile>,
    budget: WalkBudget,
    yielded: usize,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>, budget: WalkBudget) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back((root.into(), 0));
        Self {
            queue,
            ready: VecDeque::new(),
            budget,
            yielded: 0,
        }
    }

    /// Bounded tier: the budget's file cap clamped to [`BOUNDED_MAX_FILES`].
    pub fn bounded(root: impl Into<PathBuf>, budget: WalkBudget) -> Self {
        let max_files = budget.max_files.min(BOUNDED_MAX_FILES);
        Self::new(root, WalkBudget::new(max_files, budget.max_depth))
    }

    /// List one directory, buffering its files and queueing its subdirectories.
    fn visit(&mut self, dir: &Path, depth: usize) {
        let Ok(read_dir) = fs::read_dir(dir) else {
            log::trace!("cannot list {}", dir.display());
            return;
        };
        for entry in read_dir.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if file_type.is_file() {
                if let Ok(meta) = entry.metadata() {
                    self.ready
                        .push_back(CandidateFile::from_metadata(entry.path(), &meta));
                }
            } else if file_type.is_dir()
                && depth + 1 < self.budget.max_depth
                && !is_protected_dir(&name)
            {
                self.queue.push_back((entry.path(), depth + 1));
            }
        }
    }
}

impl Iterator for TreeWalker {
    type Item = CandidateFile;

    fn next(&mut self) -> Option<CandidateFile> {
        loop {
            if self.yielded >= self.budget.max_files {
                self.queue.clear();
                self.ready.clear();
                return None;
            }
            if let Some(file) = self.ready.pop_front() {
                self.yielded += 1;
                return Some(file);
            }
            let (dir, depth) = self.queue.pop_front()?;
            if depth >= self.budget.max_depth {
                continue;
            }
            self.visit(&dir, depth);
        }
    }
}

/// Single-level scan of `dir` for files of at least `min_size`, largest first.
pub fn large_files_first(dir: &Path, min_size: u64) -> Vec<CandidateFile> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<CandidateFile> = read_dir
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            (meta.len() >= min_size).then(|| CandidateFile::from_metadata(e.path(), &meta))
        })
        .collect();
    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    fn depth_below(root: &Path, file: &Path) -> usize {
        file.strip_prefix(root).unwrap().components().count()
    }

    #[test]
    fn never_exceeds_depth_budget() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("f0"), 1);
        touch(&root.join("a/f1"), 1);
        touch(&root.join("a/b/f2"), 1);
        touch(&root.join("a/b/c/f3"), 1);
        touch(&root.join("a/b/c/d/f4"), 1);

        for max_depth in 0..6 {
            let files: Vec<_> = TreeWalker::new(root, WalkBudget::new(1000, max_depth)).collect();
            assert_eq!(files.len(), max_depth.min(5), "depth {max_depth}");
            assert!(files.iter().all(|f| depth_below(root, &f.path) <= max_depth));
        }
    }

    #[test]
    fn skips_protected_directories_in_any_case() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("System32/evil.dll"), 1);
        touch(&root.join("DRIVERS/x.sys"), 1);
        touch(&root.join("cache/ok.tmp"), 1);

        let files: Vec<_> = TreeWalker::new(root, WalkBudget::new(usize::MAX, 10))
            .map(|f| f.path)
            .collect();
        assert_eq!(files, vec![root.join("cache/ok.tmp")]);
    }

    #[test]
    fn stops_at_file_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            touch(&dir.path().join(format!("f{i}.tmp")), 1);
            touch(&dir.path().join(format!("sub/g{i}.tmp")), 1);
        }
        assert_eq!(TreeWalker::new(dir.path(), WalkBudget::new(7, 10)).count(), 7);
        assert_eq!(TreeWalker::new(dir.path(), WalkBudget::new(25, 10)).count(), 25);
    }

    #[test]
    fn bounded_tier_clamps_the_file_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(BOUNDED_MAX_FILES + 10) {
            fs::write(dir.path().join(format!("f{i}")), b"").unwrap();
        }
        let fast = TreeWalker::new(dir.path(), WalkBudget::new(usize::MAX, 2)).count();
        assert_eq!(fast, BOUNDED_MAX_FILES + 10);
        let bounded = TreeWalker::bounded(dir.path(), WalkBudget::new(usize::MAX, 2)).count();
        assert_eq!(bounded, BOUNDED_MAX_FILES);
        let small = TreeWalker::bounded(dir.path(), WalkBudget::new(3, 2)).count();
        assert_eq!(small, 3);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let walk = TreeWalker::new("/no/such/reclaim/root", WalkBudget::new(100, 5));
        assert_eq!(walk.count(), 0);
    }

    #[test]
    fn large_files_first_sorts_descending_and_stays_shallow() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("small"), 10);
        touch(&dir.path().join("big"), 5_000);
        touch(&dir.path().join("mid"), 2_000);
        touch(&dir.path().join("sub/huge"), 50_000);

        let sizes: Vec<_> = large_files_first(dir.path(), 100)
            .into_iter()
            .map(|f| f.size)
            .collect();
        assert_eq!(sizes, vec![5_000, 2_000]);
    }
}

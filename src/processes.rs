//! Which running processes hold a file open.
//!
//! The index is a point-in-time snapshot. It is rebuilt per category run, not
//! per file, so a file opened after the snapshot goes unnoticed until the
//! delete gate's own heuristics catch it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sysinfo::{ProcessesToUpdate, System};

/// Core OS processes whose open handles are ignored.
pub const PROCESS_WHITELIST: &[&str] = &[
    "explorer.exe",
    "dwm.exe",
    "winlogon.exe",
    "csrss.exe",
    "smss.exe",
    "wininit.exe",
    "services.exe",
    "lsass.exe",
    "svchost.exe",
    "System",
    "Registry",
];

fn is_whitelisted(name: &str) -> bool {
    PROCESS_WHITELIST.iter().any(|w| w.eq_ignore_ascii_case(name))
}

/// Reports the process holding a file open, if any.
pub trait OpenFileProbe: Send + Sync {
    /// `Some("name (PID: n)")` when a non-whitelisted process has `path` open.
    fn holder(&self, path: &Path) -> Option<String>;
}

#[derive(Debug, Default, Clone)]
pub struct OpenFileIndex {
    open: HashMap<PathBuf, String>,
}

impl OpenFileIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record that `process` holds `path`. Whitelisted processes are dropped.
    pub fn insert(&mut self, path: PathBuf, process: &str, pid: u32) {
        if is_whitelisted(process) {
            return;
        }
        self.open
            .entry(path)
            .or_insert_with(|| format!("{process} (PID: {pid})"));
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Snapshot the open files of every visible process.
    pub fn snapshot() -> Self {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut index = Self::empty();
        for (pid, process) in sys.processes() {
            let name = process.name().to_string_lossy();
            if is_whitelisted(&name) {
                continue;
            }
            for path in open_files(pid.as_u32()) {
                index.insert(path, &name, pid.as_u32());
            }
        }
        log::debug!("open-file snapshot: {} paths held", index.len());
        index
    }
}

impl OpenFileProbe for OpenFileIndex {
    fn holder(&self, path: &Path) -> Option<String> {
        if self.open.is_empty() {
            return None;
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.open
            .get(&canonical)
            .or_else(|| self.open.get(path))
            .cloned()
    }
}

/// Paths behind a process's file descriptors. Processes we may not inspect
/// contribute nothing.
#[cfg(target_os = "linux")]
fn open_files(pid: u32) -> Vec<PathBuf> {
    let fd_dir = PathBuf::from(format!("/proc/{pid}/fd"));
    let Ok(entries) = std::fs::read_dir(&fd_dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| std::fs::read_link(e.path()).ok())
        .filter(|target| target.is_absolute())
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn open_files(_pid: u32) -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_holders_are_ignored() {
        let mut index = OpenFileIndex::empty();
        index.insert(PathBuf::from("/data/a.tmp"), "svchost.exe", 4);
        index.insert(PathBuf::from("/data/b.tmp"), "editor", 42);

        assert_eq!(index.holder(Path::new("/data/a.tmp")), None);
        assert_eq!(
            index.holder(Path::new("/data/b.tmp")).as_deref(),
            Some("editor (PID: 42)")
        );
    }

    #[test]
    fn empty_index_holds_nothing() {
        let index = OpenFileIndex::empty();
        assert!(index.is_empty());
        assert_eq!(index.holder(Path::new("/anything")), None);
    }
}

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Home directory, if the platform can report one.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Sum of regular-file sizes below `path`. Unreadable entries count as zero.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Size of a file, or of everything below a directory.
pub fn entry_size(path: &Path) -> u64 {
    if path.is_dir() {
        dir_size(path)
    } else {
        path.metadata().map(|m| m.len()).unwrap_or(0)
    }
}

/// Remove every empty directory below `root`, deepest first. `root` itself is kept.
/// Returns how many directories were removed.
pub fn remove_empty_dirs(root: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = std::fs::read_dir(entry.path())
            .map(|mut rd| rd.next().is_none())
            .unwrap_or(false);
        if is_empty && std::fs::remove_dir(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Whether the current process runs with elevated rights (root on Unix).
#[cfg(unix)]
pub fn has_elevated_rights() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn has_elevated_rights() -> bool {
    false
}

/// Whether the current process may write to `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    path.metadata()
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

/// Parse a size such as `100MB`, `2 kb` or `512` (bytes) into bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let upper = s.trim().to_ascii_uppercase();
    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, factor)| upper.strip_suffix(*suffix).map(|n| (n, *factor)))
        .unwrap_or_else(|| (upper.strip_suffix('B').unwrap_or(&upper), 1));

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("not a size: '{}'", s.trim()))?;
    if value < 0.0 {
        return Err("size cannot be negative".to_string());
    }
    Ok((value * multiplier as f64) as u64)
}

/// Byte count in the largest unit that keeps the value at or above one.
pub fn format_size(bytes: u64) -> String {
    UNITS
        .iter()
        .find(|(_, factor)| bytes >= *factor)
        .map(|(unit, factor)| format!("{:.2} {unit}", bytes as f64 / *factor as f64))
        .unwrap_or_else(|| format!("{bytes} B"))
}

/// Shorten a path for display by replacing home dir with ~.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = home_dir() {
        if let Ok(relative) = path.strip_prefix(&home) {
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}

/// Local wall-clock timestamp used in reports and backup folders.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

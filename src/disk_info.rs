//! Free-space snapshots taken around a real cleanup.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total: u64,
    pub available: u64,
}

impl DiskSpace {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn usage_percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.used() as f32 / self.total as f32 * 100.0
    }

    /// Bytes that became available since `before`. Other writers on the
    /// same filesystem can make this smaller than what was deleted.
    pub fn gained_since(&self, before: &DiskSpace) -> u64 {
        self.available.saturating_sub(before.available)
    }
}

/// Capacity of the filesystem holding `path`.
#[cfg(unix)]
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    if unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) } != 0 {
        log::debug!("statvfs failed for {}", path.display());
        return None;
    }
    let stat = unsafe { stat.assume_init() };
    let frsize = stat.f_frsize as u64;
    Some(DiskSpace {
        total: stat.f_blocks as u64 * frsize,
        available: stat.f_bavail as u64 * frsize,
    })
}

#[cfg(not(unix))]
pub fn disk_space(_path: &Path) -> Option<DiskSpace> {
    None
}

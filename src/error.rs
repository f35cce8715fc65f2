//! Error types shared by the reclamation engine.
//!
//! Every filesystem probe returns one of these instead of swallowing the
//! failure, so the "treat unreadable as absent" and "treat unknown as unsafe"
//! policies are explicit at each call site.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A path template could not be turned into a concrete path.
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("environment variable `{0}` is not set")]
    MissingVariable(String),

    #[error("no home directory for `~` expansion")]
    NoHomeDir,

    #[error("invalid wildcard pattern `{pattern}`: {reason}")]
    BadPattern { pattern: String, reason: String },
}

/// A metadata or directory probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{path}: not found")]
    NotFound { path: PathBuf },

    #[error("{path}: not a regular file")]
    NotAFile { path: PathBuf },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            ProbeError::NotFound { path }
        } else {
            ProbeError::Io { path, source }
        }
    }
}

/// Why a single file could not be removed.
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("File is protected system file")]
    Protected,

    #[error("File appears to be in active use")]
    ActiveUse,

    #[error("Insufficient permissions to delete file")]
    InsufficientPermissions,

    #[error("Permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("OS Error: {0}")]
    Io(#[source] io::Error),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),
}

impl DeleteError {
    /// Routine failures that are recorded but never fail a batch.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            DeleteError::ActiveUse
                | DeleteError::InsufficientPermissions
                | DeleteError::PermissionDenied(_)
        )
    }

    /// Short label used when grouping failures.
    pub fn kind_label(&self) -> &'static str {
        match self {
            DeleteError::Protected => "Protected",
            DeleteError::ActiveUse => "Active use",
            DeleteError::InsufficientPermissions => "Insufficient permissions",
            DeleteError::PermissionDenied(_) => "Permission denied",
            DeleteError::Io(_) => "OS Error",
            DeleteError::Backup(_) => "Backup failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot create backup directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot update backup manifest: {0}")]
    Manifest(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown category `{0}`")]
    UnknownCategory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_class_covers_routine_failures() {
        assert!(DeleteError::ActiveUse.is_expected());
        assert!(DeleteError::InsufficientPermissions.is_expected());
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(DeleteError::PermissionDenied(denied).is_expected());

        assert!(!DeleteError::Protected.is_expected());
        assert!(!DeleteError::Io(io::Error::other("disk")).is_expected());
    }

    #[test]
    fn probe_error_maps_not_found() {
        let err = ProbeError::io("/x", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProbeError::NotFound { .. }));
    }
}

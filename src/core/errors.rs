//! FP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FpError>;

/// Classification of a single-entry deletion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryErrorKind {
    /// Permission denied / not owner.
    Access,
    /// Entry is open by another process.
    Sharing,
    /// Entry vanished between scan and delete.
    NotFound,
    /// Directory still has children.
    DirNotEmpty,
    /// Any other I/O failure.
    Io,
}

impl EntryErrorKind {
    /// Map an OS-level error onto the surfaced kinds.
    #[must_use]
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => return Self::NotFound,
            io::ErrorKind::PermissionDenied => return Self::Access,
            _ => {}
        }

        let Some(code) = err.raw_os_error() else {
            return Self::Io;
        };

        #[cfg(windows)]
        {
            // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION / ERROR_DIR_NOT_EMPTY
            match code {
                32 | 33 => Self::Sharing,
                145 => Self::DirNotEmpty,
                _ => Self::Io,
            }
        }
        #[cfg(not(windows))]
        {
            match code {
                code if code == libc::ENOTEMPTY => Self::DirNotEmpty,
                code if code == libc::EBUSY || code == libc::ETXTBSY => Self::Sharing,
                _ => Self::Io,
            }
        }
    }

    /// `NotFound` means the goal is already achieved.
    #[must_use]
    pub const fn counts_as_success(self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl std::fmt::Display for EntryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Access => "access denied",
            Self::Sharing => "sharing violation",
            Self::NotFound => "not found",
            Self::DirNotEmpty => "directory not empty",
            Self::Io => "io error",
        };
        f.write_str(label)
    }
}

/// Top-level error type for fastpurge.
#[derive(Debug, Error)]
pub enum FpError {
    #[error("[FP-1001] invalid argument: {details}")]
    InvalidArgument { details: String },

    #[error("[FP-1101] unsupported on this platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[FP-2001] refusing unsafe deletion target {path}: {reason}")]
    UnsafeTarget { path: PathBuf, reason: String },

    #[error("[FP-2002] path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("[FP-2003] access denied for {path}")]
    AccessDenied { path: PathBuf },

    #[error("[FP-2101] scan failure for {path}: {details}")]
    ScanFailed { path: PathBuf, details: String },

    #[error("[FP-3001] deletion failed for {path}: {kind}: {message}")]
    EntryFailed {
        path: PathBuf,
        kind: EntryErrorKind,
        message: String,
    },

    #[error("[FP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[FP-3100] operation cancelled")]
    Cancelled,

    #[error("[FP-3900] internal failure: {details}")]
    Internal { details: String },
}

impl FpError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "FP-1001",
            Self::UnsupportedPlatform { .. } => "FP-1101",
            Self::UnsafeTarget { .. } => "FP-2001",
            Self::NotFound { .. } => "FP-2002",
            Self::AccessDenied { .. } => "FP-2003",
            Self::ScanFailed { .. } => "FP-2101",
            Self::EntryFailed { .. } => "FP-3001",
            Self::Io { .. } => "FP-3002",
            Self::Cancelled => "FP-3100",
            Self::Internal { .. } => "FP-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::EntryFailed { .. } | Self::ScanFailed { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<toml::de::Error> for FpError {
    fn from(value: toml::de::Error) -> Self {
        Self::InvalidArgument {
            details: format!("config parse failure: {value}"),
        }
    }
}

impl From<serde_json::Error> for FpError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal {
            details: format!("serialization failure: {value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<FpError> {
        vec![
            FpError::InvalidArgument {
                details: String::new(),
            },
            FpError::UnsupportedPlatform {
                details: String::new(),
            },
            FpError::UnsafeTarget {
                path: PathBuf::new(),
                reason: String::new(),
            },
            FpError::NotFound {
                path: PathBuf::new(),
            },
            FpError::AccessDenied {
                path: PathBuf::new(),
            },
            FpError::ScanFailed {
                path: PathBuf::new(),
                details: String::new(),
            },
            FpError::EntryFailed {
                path: PathBuf::new(),
                kind: EntryErrorKind::Io,
                message: String::new(),
            },
            FpError::Io {
                path: PathBuf::new(),
                source: io::Error::other("test"),
            },
            FpError::Cancelled,
            FpError::Internal {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = every_variant();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_fp_prefix() {
        for err in &every_variant() {
            assert!(
                err.code().starts_with("FP-"),
                "code {} must start with FP-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = FpError::UnsafeTarget {
            path: PathBuf::from("/etc"),
            reason: "protected path".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("FP-2001"), "display should carry code: {msg}");
        assert!(
            msg.contains("protected path"),
            "display should carry reason: {msg}"
        );
    }

    #[test]
    fn not_found_entries_count_as_success() {
        assert!(EntryErrorKind::NotFound.counts_as_success());
        assert!(!EntryErrorKind::Access.counts_as_success());
        assert!(!EntryErrorKind::Sharing.counts_as_success());
        assert!(!EntryErrorKind::DirNotEmpty.counts_as_success());
        assert!(!EntryErrorKind::Io.counts_as_success());
    }

    #[test]
    fn classify_maps_common_io_kinds() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(
            EntryErrorKind::classify(&not_found),
            EntryErrorKind::NotFound
        );

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(EntryErrorKind::classify(&denied), EntryErrorKind::Access);

        let other = io::Error::other("mystery");
        assert_eq!(EntryErrorKind::classify(&other), EntryErrorKind::Io);
    }

    #[cfg(unix)]
    #[test]
    fn classify_maps_unix_errnos() {
        let not_empty = io::Error::from_raw_os_error(libc::ENOTEMPTY);
        assert_eq!(
            EntryErrorKind::classify(&not_empty),
            EntryErrorKind::DirNotEmpty
        );

        let busy = io::Error::from_raw_os_error(libc::EBUSY);
        assert_eq!(EntryErrorKind::classify(&busy), EntryErrorKind::Sharing);
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(
            FpError::EntryFailed {
                path: PathBuf::new(),
                kind: EntryErrorKind::Sharing,
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            !FpError::UnsafeTarget {
                path: PathBuf::new(),
                reason: String::new(),
            }
            .is_retryable()
        );
        assert!(!FpError::Cancelled.is_retryable());
    }

    #[test]
    fn io_convenience_constructor() {
        let err = FpError::io(
            "/tmp/test.txt",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "FP-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }
}

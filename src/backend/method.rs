//! The closed set of deletion primitives.

use std::str::FromStr;

use crate::core::errors::FpError;

/// How a single entry gets removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMethod {
    /// Open with delete share, set disposition-on-close, close.
    FileInfo,
    /// Open with `FILE_FLAG_DELETE_ON_CLOSE`, close.
    DeleteOnClose,
    /// Low-level kernel delete call.
    NtApi,
    /// The platform's ordinary unlink / rmdir. Works everywhere.
    DeleteApi,
    /// Pick the fastest available primitive, cascading on failure.
    Auto,
}

impl DeletionMethod {
    /// Cascade order for files when `Auto` is selected.
    #[must_use]
    pub fn auto_cascade() -> &'static [DeletionMethod] {
        if cfg!(windows) {
            &[
                Self::FileInfo,
                Self::DeleteOnClose,
                Self::NtApi,
                Self::DeleteApi,
            ]
        } else {
            // Only the portable primitive exists off Windows.
            &[Self::DeleteApi]
        }
    }

    /// Concrete methods a benchmark can time on this host.
    #[must_use]
    pub fn benchmarkable() -> &'static [DeletionMethod] {
        Self::auto_cascade()
    }

    /// Only the portable primitive removes directories.
    #[must_use]
    pub const fn applies_to_directories(self) -> bool {
        matches!(self, Self::DeleteApi | Self::Auto)
    }

    /// CLI/config spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileInfo => "fileinfo",
            Self::DeleteOnClose => "deleteonclose",
            Self::NtApi => "ntapi",
            Self::DeleteApi => "deleteapi",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for DeletionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionMethod {
    type Err = FpError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fileinfo" => Ok(Self::FileInfo),
            "deleteonclose" => Ok(Self::DeleteOnClose),
            "ntapi" => Ok(Self::NtApi),
            "deleteapi" => Ok(Self::DeleteApi),
            "auto" => Ok(Self::Auto),
            other => Err(FpError::InvalidArgument {
                details: format!(
                    "unknown deletion method '{other}' (expected auto, fileinfo, deleteonclose, ntapi, or deleteapi)"
                ),
            }),
        }
    }
}

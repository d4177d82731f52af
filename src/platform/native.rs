//! Pre-converted native path buffers.
//!
//! Every plan entry carries its path in the form the deletion syscalls
//! consume: NUL-terminated UTF-16 in extended-length (`\\?\`) form on
//! Windows, a NUL-terminated byte string elsewhere. Conversion happens once
//! during the scan so the hot deletion loop never re-encodes paths.

use std::path::Path;

use crate::core::errors::{FpError, Result};

/// One pre-converted path buffer, owned by the plan and borrowed by workers
/// for the duration of a single deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePath {
    #[cfg(windows)]
    buf: Vec<u16>,
    #[cfg(not(windows))]
    buf: std::ffi::CString,
}

impl NativePath {
    /// Convert an absolute path into its native syscall form.
    ///
    /// Windows paths get the `\\?\` (or `\\?\UNC\`) prefix so deletions work
    /// past `MAX_PATH`; the buffer is NUL-terminated. Fails on relative
    /// paths and on paths with interior NULs.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_absolute() {
            return Err(FpError::Internal {
                details: format!(
                    "native conversion requires an absolute path, got {}",
                    path.display()
                ),
            });
        }

        #[cfg(windows)]
        {
            use std::os::windows::ffi::OsStrExt;

            let raw = path.as_os_str().to_string_lossy();
            let prefixed: Vec<u16> = if raw.starts_with(r"\\?\") {
                path.as_os_str().encode_wide().collect()
            } else if let Some(rest) = raw.strip_prefix(r"\\") {
                // UNC share: \\server\share -> \\?\UNC\server\share
                let mut wide: Vec<u16> = r"\\?\UNC\".encode_utf16().collect();
                wide.extend(rest.encode_utf16());
                wide
            } else {
                let mut wide: Vec<u16> = r"\\?\".encode_utf16().collect();
                wide.extend(path.as_os_str().encode_wide());
                wide
            };

            if prefixed.contains(&0) {
                return Err(FpError::Internal {
                    details: format!("path contains interior NUL: {}", path.display()),
                });
            }

            let mut buf = prefixed;
            buf.push(0);
            Ok(Self { buf })
        }

        #[cfg(not(windows))]
        {
            use std::os::unix::ffi::OsStrExt;

            let buf = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                FpError::Internal {
                    details: format!("path contains interior NUL: {}", path.display()),
                }
            })?;
            Ok(Self { buf })
        }
    }

    /// Whether the buffer holds no path data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        #[cfg(windows)]
        {
            self.buf.len() <= 1
        }
        #[cfg(not(windows))]
        {
            self.buf.as_bytes().is_empty()
        }
    }

    /// The UTF-16 buffer including the terminating NUL.
    #[cfg(windows)]
    #[must_use]
    pub fn as_wide_with_nul(&self) -> &[u16] {
        &self.buf
    }

    /// A copy of the buffer rewritten for the NT native namespace
    /// (`\\?\` becomes `\??\`), still NUL-terminated.
    #[cfg(windows)]
    #[must_use]
    pub fn to_nt_wide(&self) -> Vec<u16> {
        let mut nt = self.buf.clone();
        // Both prefixes are four units long; only the second differs.
        if nt.len() >= 4 && nt[..4] == [92, 92, 63, 92] {
            nt[1] = u16::from(b'?');
        }
        nt
    }

    /// The NUL-terminated byte form used by unlink/rmdir.
    #[cfg(not(windows))]
    #[must_use]
    pub fn as_c_str(&self) -> &std::ffi::CStr {
        &self.buf
    }
}

//! Portable deletion primitive for non-Windows hosts.
//!
//! Consumes the plan's pre-converted byte buffers directly so the hot loop
//! never re-encodes paths.

#![cfg(not(windows))]

use std::io;

use crate::platform::native::NativePath;

/// Unlink one file (or symlink).
pub fn delete_file(native: &NativePath) -> io::Result<()> {
    let rc = unsafe { libc::unlink(native.as_c_str().as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Remove one empty directory.
pub fn remove_dir(native: &NativePath) -> io::Result<()> {
    let rc = unsafe { libc::rmdir(native.as_c_str().as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

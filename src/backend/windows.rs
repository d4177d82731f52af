//! Windows deletion primitives.
//!
//! All four file primitives consume the plan's extended-length UTF-16
//! buffers. Handles are opened with full share flags and
//! `FILE_FLAG_OPEN_REPARSE_POINT` so a link is removed as a link, never
//! through its target. The ordinary-API variants clear a read-only
//! attribute once and retry on access denial, matching what the cascade
//! expects from its last resort.

#![cfg(windows)]

use std::ffi::c_void;
use std::io;

use windows::Wdk::Foundation::OBJECT_ATTRIBUTES;
use windows::Wdk::Storage::FileSystem::NtDeleteFile;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, HANDLE, RtlNtStatusToDosError, UNICODE_STRING,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, DELETE, DeleteFileW, FILE_ATTRIBUTE_NORMAL, FILE_DISPOSITION_INFO,
    FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_DELETE_ON_CLOSE, FILE_FLAG_OPEN_REPARSE_POINT,
    FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
    FileDispositionInfo, OPEN_EXISTING, RemoveDirectoryW, SetFileAttributesW,
    SetFileInformationByHandle,
};
use windows::core::PCWSTR;

use crate::platform::native::NativePath;

/// `OBJ_CASE_INSENSITIVE` for the NT object attributes.
const OBJ_CASE_INSENSITIVE: u32 = 0x0000_0040;

fn pcwstr(native: &NativePath) -> PCWSTR {
    PCWSTR(native.as_wide_with_nul().as_ptr())
}

fn win_to_io(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0 & 0xFFFF)
}

fn open_for_delete(native: &NativePath, flags: FILE_FLAGS_AND_ATTRIBUTES) -> io::Result<HANDLE> {
    unsafe {
        CreateFileW(
            pcwstr(native),
            DELETE.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            flags,
            HANDLE::default(),
        )
    }
    .map_err(win_to_io)
}

/// `FileInfo` method: set the disposition-on-close flag through an open
/// handle, then close it.
pub(super) fn delete_file_disposition(native: &NativePath) -> io::Result<()> {
    let handle = open_for_delete(
        native,
        FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
    )?;

    let info = FILE_DISPOSITION_INFO {
        DeleteFile: true.into(),
    };
    let set = unsafe {
        SetFileInformationByHandle(
            handle,
            FileDispositionInfo,
            std::ptr::from_ref(&info).cast::<c_void>(),
            u32::try_from(std::mem::size_of::<FILE_DISPOSITION_INFO>())
                .map_err(|_| io::Error::other("disposition info size"))?,
        )
    };
    let closed = unsafe { CloseHandle(handle) };

    set.map_err(win_to_io)?;
    closed.map_err(win_to_io)
}

/// `DeleteOnClose` method: the open itself schedules the delete.
pub(super) fn delete_file_on_close(native: &NativePath) -> io::Result<()> {
    let handle = open_for_delete(
        native,
        FILE_FLAG_DELETE_ON_CLOSE | FILE_FLAG_OPEN_REPARSE_POINT,
    )?;
    unsafe { CloseHandle(handle) }.map_err(win_to_io)
}

/// `NtApi` method: one kernel call against the NT namespace form of the
/// pre-converted buffer.
pub(super) fn delete_file_nt(native: &NativePath) -> io::Result<()> {
    let nt_wide = native.to_nt_wide();
    let name_bytes = u16::try_from((nt_wide.len() - 1) * 2)
        .map_err(|_| io::Error::other("path too long for UNICODE_STRING"))?;

    let name = UNICODE_STRING {
        Length: name_bytes,
        MaximumLength: name_bytes + 2,
        Buffer: windows::core::PWSTR(nt_wide.as_ptr().cast_mut()),
    };
    let attributes = OBJECT_ATTRIBUTES {
        Length: u32::try_from(std::mem::size_of::<OBJECT_ATTRIBUTES>())
            .map_err(|_| io::Error::other("object attributes size"))?,
        RootDirectory: HANDLE::default(),
        ObjectName: std::ptr::from_ref(&name),
        Attributes: OBJ_CASE_INSENSITIVE,
        SecurityDescriptor: std::ptr::null(),
        SecurityQualityOfService: std::ptr::null(),
    };

    let status = unsafe { NtDeleteFile(&attributes) };
    if status.is_ok() {
        Ok(())
    } else {
        let dos = unsafe { RtlNtStatusToDosError(status) };
        Err(io::Error::from_raw_os_error(dos as i32))
    }
}

/// `DeleteApi` for files.
pub(super) fn delete_file_api(native: &NativePath) -> io::Result<()> {
    match unsafe { DeleteFileW(pcwstr(native)) } {
        Ok(()) => Ok(()),
        Err(e) if e.code() == ERROR_ACCESS_DENIED.to_hresult() => {
            clear_readonly(native);
            unsafe { DeleteFileW(pcwstr(native)) }.map_err(win_to_io)
        }
        Err(e) => Err(win_to_io(e)),
    }
}

/// `DeleteApi` for directories.
pub(super) fn remove_dir_api(native: &NativePath) -> io::Result<()> {
    match unsafe { RemoveDirectoryW(pcwstr(native)) } {
        Ok(()) => Ok(()),
        Err(e) if e.code() == ERROR_ACCESS_DENIED.to_hresult() => {
            clear_readonly(native);
            unsafe { RemoveDirectoryW(pcwstr(native)) }.map_err(win_to_io)
        }
        Err(e) => Err(win_to_io(e)),
    }
}

fn clear_readonly(native: &NativePath) {
    let _ = unsafe { SetFileAttributesW(pcwstr(native), FILE_ATTRIBUTE_NORMAL) };
}

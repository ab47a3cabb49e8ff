//! Libarchive entry headers built from on-disk metadata

use crate::error::{Error, Result};
use crate::metadata::{EntryKind, EntryMetadata};
use std::ffi::CString;
use std::path::Path;
use std::time::SystemTime;

#[cfg(unix)]
const S_IFMT: u32 = libc::S_IFMT as u32;
#[cfg(not(unix))]
const S_IFMT: u32 = 0o170000;

fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::InvalidArgument(format!("{what} contains null byte")))
}

/// Owned `archive_entry` describing one header to write
pub(crate) struct EntryMut {
    pub(crate) entry: *mut libarchive2_sys::archive_entry,
}

impl EntryMut {
    /// Create an empty entry
    pub(crate) fn new() -> Result<Self> {
        unsafe {
            let entry = libarchive2_sys::archive_entry_new();
            if entry.is_null() {
                return Err(Error::NullPointer);
            }
            Ok(EntryMut { entry })
        }
    }

    /// Create an entry named `pathname` carrying `meta`
    pub(crate) fn from_metadata(pathname: &str, meta: &EntryMetadata) -> Result<Self> {
        let mut entry = Self::new()?;
        entry.set_pathname(pathname)?;
        entry.set_filetype(meta.mode & S_IFMT);
        entry.set_perm(meta.perm());
        entry.set_size(meta.size);
        entry.set_mtime(meta.mtime);
        entry.set_owner(meta.uid, meta.gid);
        if let EntryKind::Symlink(target) = &meta.kind {
            entry.set_symlink(target)?;
        }
        Ok(entry)
    }

    fn set_pathname(&mut self, pathname: &str) -> Result<()> {
        let c_path = c_string(pathname, "Path")?;
        unsafe {
            libarchive2_sys::archive_entry_set_pathname_utf8(self.entry, c_path.as_ptr());
        }
        Ok(())
    }

    fn set_filetype(&mut self, filetype: u32) {
        unsafe {
            libarchive2_sys::archive_entry_set_filetype(self.entry, filetype as _);
        }
    }

    fn set_perm(&mut self, perm: u32) {
        // mode_t is u32 on Linux and u16 on macOS/Windows
        unsafe {
            libarchive2_sys::archive_entry_set_perm(self.entry, perm as _);
        }
    }

    fn set_size(&mut self, size: u64) {
        unsafe {
            libarchive2_sys::archive_entry_set_size(self.entry, size as i64);
        }
    }

    fn set_mtime(&mut self, time: SystemTime) {
        if let Ok(duration) = time.duration_since(SystemTime::UNIX_EPOCH) {
            unsafe {
                libarchive2_sys::archive_entry_set_mtime(
                    self.entry,
                    duration.as_secs() as _,
                    duration.subsec_nanos() as _,
                );
            }
        }
    }

    fn set_owner(&mut self, uid: u32, gid: u32) {
        unsafe {
            libarchive2_sys::archive_entry_set_uid(self.entry, uid as i64);
            libarchive2_sys::archive_entry_set_gid(self.entry, gid as i64);
        }
    }

    fn set_symlink(&mut self, target: &Path) -> Result<()> {
        let target = target
            .to_str()
            .ok_or_else(|| Error::InvalidArgument("Symlink target contains invalid UTF-8".to_string()))?;
        let c_target = c_string(target, "Symlink target")?;
        unsafe {
            libarchive2_sys::archive_entry_set_symlink_utf8(self.entry, c_target.as_ptr());
        }
        Ok(())
    }
}

impl Drop for EntryMut {
    fn drop(&mut self) {
        if !self.entry.is_null() {
            unsafe {
                libarchive2_sys::archive_entry_free(self.entry);
            }
        }
    }
}

//! Stat-derived metadata for on-disk paths

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of filesystem object an entry describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link with its (unresolved) target
    Symlink(PathBuf),
    /// Device, FIFO or socket
    Other,
}

/// Metadata of a path as it will be recorded in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Kind of object
    pub kind: EntryKind,
    /// Full Unix mode, file type bits included
    pub mode: u32,
    /// Size in bytes of the entry body
    pub size: u64,
    /// Modification time
    pub mtime: SystemTime,
    /// Owner user ID
    pub uid: u32,
    /// Owner group ID
    pub gid: u32,
}

impl EntryMetadata {
    /// Metadata of `path` itself; symlinks are not followed
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::symlink_metadata(path)?;
        let kind = if meta.file_type().is_symlink() {
            EntryKind::Symlink(fs::read_link(path)?)
        } else {
            kind_of(&meta)
        };
        Ok(Self::build(kind, &meta))
    }

    /// Metadata of whatever `path` resolves to
    pub fn from_target<P: AsRef<Path>>(path: P) -> Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self::build(kind_of(&meta), &meta))
    }

    fn build(kind: EntryKind, meta: &fs::Metadata) -> Self {
        let size = match kind {
            EntryKind::File => meta.len(),
            _ => 0,
        };
        let (mode, uid, gid) = ownership(meta, &kind);
        EntryMetadata {
            kind,
            mode,
            size,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            uid,
            gid,
        }
    }

    /// Permission bits (including setuid/setgid/sticky)
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Whether this describes a directory
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

fn kind_of(meta: &fs::Metadata) -> EntryKind {
    let file_type = meta.file_type();
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[cfg(unix)]
fn ownership(meta: &fs::Metadata, _kind: &EntryKind) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode(), meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn ownership(meta: &fs::Metadata, kind: &EntryKind) -> (u32, u32, u32) {
    let perm = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    let mode = match kind {
        EntryKind::Directory => 0o040000 | perm | 0o111,
        EntryKind::Symlink(_) => 0o120000 | 0o777,
        _ => 0o100000 | perm,
    };
    (mode, 0, 0)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::{PermissionsExt, symlink};

    #[test]
    fn test_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        fs::write(&path, b"12345").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let meta = EntryMetadata::from_path(&path).unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 5);
        assert_eq!(meta.perm(), 0o640);
        assert_eq!(meta.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
    }

    #[test]
    fn test_symlink_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), b"data").unwrap();
        let link = dir.path().join("link");
        symlink("target.txt", &link).unwrap();

        let meta = EntryMetadata::from_path(&link).unwrap();
        assert_eq!(meta.kind, EntryKind::Symlink(PathBuf::from("target.txt")));
        assert_eq!(meta.size, 0);

        let resolved = EntryMetadata::from_target(&link).unwrap();
        assert_eq!(resolved.kind, EntryKind::File);
        assert_eq!(resolved.size, 4);
    }

    #[test]
    fn test_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling");
        symlink("missing", &link).unwrap();

        let meta = EntryMetadata::from_path(&link).unwrap();
        assert!(matches!(meta.kind, EntryKind::Symlink(_)));
        assert!(EntryMetadata::from_target(&link).is_err());
    }

    #[test]
    fn test_directory_has_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let meta = EntryMetadata::from_path(dir.path()).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.size, 0);
    }
}

//! Helpers for reading produced archives back

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::Path;

/// One entry read back from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    pub name: String,
    pub kind: Kind,
    pub mode: u32,
    pub data: Vec<u8>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Directory,
    Symlink,
    Other,
}

pub fn read_tar<R: Read>(reader: R) -> Vec<ReadEntry> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let kind = match entry.header().entry_type() {
            tar::EntryType::Regular => Kind::File,
            tar::EntryType::Directory => Kind::Directory,
            tar::EntryType::Symlink => Kind::Symlink,
            _ => Kind::Other,
        };
        let mode = entry.header().mode().unwrap();
        let link = entry
            .link_name()
            .unwrap()
            .map(|link| link.to_string_lossy().into_owned());
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.push(ReadEntry {
            name,
            kind,
            mode,
            data,
            link,
        });
    }
    entries
}

pub fn read_tar_gz(bytes: &[u8]) -> Vec<ReadEntry> {
    read_tar(flate2::read::GzDecoder::new(bytes))
}

pub fn read_tar_bz2(bytes: &[u8]) -> Vec<ReadEntry> {
    read_tar(bzip2::read::BzDecoder::new(bytes))
}

pub fn read_tar_zstd(bytes: &[u8]) -> Vec<ReadEntry> {
    read_tar(zstd::stream::read::Decoder::new(bytes).unwrap())
}

pub fn read_zip(bytes: Vec<u8>) -> Vec<ReadEntry> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).unwrap();
        let mode = file.unix_mode().unwrap_or(0);
        let kind = match mode & 0o170000 {
            0o120000 => Kind::Symlink,
            0o040000 => Kind::Directory,
            _ if file.is_dir() => Kind::Directory,
            0o100000 => Kind::File,
            _ => Kind::Other,
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.push(ReadEntry {
            name: file.name().to_string(),
            kind,
            mode,
            data,
            link: None,
        });
    }
    entries
}

pub fn names(entries: &[ReadEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.name.as_str()).collect()
}

pub fn find<'a>(entries: &'a [ReadEntry], name: &str) -> &'a ReadEntry {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .unwrap_or_else(|| panic!("no entry {name:?} in {:?}", names(entries)))
}

/// Build a small environment-like tree:
///
/// ```text
/// root/
///   bin/tool          "#!/bin/sh\necho tool\n" (0755)
///   lib/libfoo.so     "libfoo"
///   share/empty/
/// ```
pub fn sample_tree(root: &Path) {
    std::fs::create_dir_all(root.join("bin")).unwrap();
    std::fs::create_dir_all(root.join("lib")).unwrap();
    std::fs::create_dir_all(root.join("share/empty")).unwrap();
    std::fs::write(root.join("bin/tool"), b"#!/bin/sh\necho tool\n").unwrap();
    std::fs::write(root.join("lib/libfoo.so"), b"libfoo").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            root.join("bin/tool"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
    }
}

/// Every path below `root`, relative and `/`-separated, parents first
pub fn walk(root: &Path) -> Vec<String> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

fn le16(bytes: &[u8], at: usize) -> usize {
    u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// Entry names and external attributes straight from the central directory
/// of a zip without Zip64 records or an archive comment
pub fn zip_external_attributes(bytes: &[u8]) -> Vec<(String, u32)> {
    let end = bytes.len() - 22;
    assert_eq!(le32(bytes, end), 0x0605_4b50, "no end of central directory");
    let mut at = le32(bytes, end + 16) as usize;
    let mut entries = Vec::new();
    while le32(bytes, at) == 0x0201_4b50 {
        let name_len = le16(bytes, at + 28);
        let skip = le16(bytes, at + 30) + le16(bytes, at + 32);
        let name = String::from_utf8(bytes[at + 46..at + 46 + name_len].to_vec()).unwrap();
        entries.push((name, le32(bytes, at + 38)));
        at += 46 + name_len + skip;
    }
    entries
}

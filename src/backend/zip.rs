//! Zip backend with symlink policy and Zip64 control

use crate::error::{Error, Result};
use crate::metadata::{EntryKind, EntryMetadata};
use crate::writer::Backend;
use chrono::{Datelike, Local, Timelike};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path};
use std::rc::Rc;
use std::time::SystemTime;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Largest entry size written without Zip64 headers
pub const ZIP64_LIMIT: u64 = (1 << 31) - 1;

/// Largest entry count of a zip without Zip64 extensions
pub const ZIP_FILECOUNT_LIMIT: usize = (1 << 16) - 1;

/// MS-DOS directory attribute in the low byte of the external attributes
pub const MSDOS_DIRECTORY: u32 = 0x10;

/// Zip entry metadata derived from a file on disk
#[derive(Debug, Clone)]
pub struct ZipEntryInfo {
    /// Normalized entry name, `/`-separated, trailing `/` for directories
    pub name: String,
    /// External attributes: Unix mode in the high 16 bits, MS-DOS flags low
    pub external_attr: u32,
    /// Uncompressed size, zero for directories
    pub size: u64,
    /// Local modification time, clamped to the zip epoch
    pub modified: DateTime,
}

impl ZipEntryInfo {
    /// Derive entry metadata from `path`, following symlinks, named `arcname`
    pub fn from_file<P: AsRef<Path>, A: AsRef<Path>>(path: P, arcname: A) -> Result<Self> {
        let meta = EntryMetadata::from_target(path)?;
        Ok(Self::from_metadata(&meta, arcname.as_ref()))
    }

    /// Derive entry metadata from already collected file metadata
    pub fn from_metadata(meta: &EntryMetadata, arcname: &Path) -> Self {
        let mut name = normalize_name(arcname);
        let mut external_attr = (meta.mode & 0xFFFF) << 16;
        let size = if meta.is_dir() {
            name.push('/');
            external_attr |= MSDOS_DIRECTORY;
            0
        } else {
            meta.size
        };

        ZipEntryInfo {
            name,
            external_attr,
            size,
            modified: zip_datetime(meta.mtime),
        }
    }

    /// Unix mode stored in the high half of the external attributes
    pub fn unix_mode(&self) -> u32 {
        self.external_attr >> 16
    }

    /// Whether the entry is a directory
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Turn an archive path into a zip entry name.
///
/// Drops drive prefixes and leading separators and resolves `.`/`..`
/// lexically.
pub fn normalize_name(arcname: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut rooted = false;
    for component in arcname.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => rooted = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                None if rooted => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

fn zip_datetime(mtime: SystemTime) -> DateTime {
    let local: chrono::DateTime<Local> = mtime.into();
    let Ok(year) = u16::try_from(local.year()) else {
        return DateTime::default();
    };
    DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second().min(59) as u8,
    )
    .unwrap_or_default()
}

/// Position of the underlying sink plus, once enabled, a copy of the
/// contiguous run of bytes written last
#[derive(Default)]
struct SinkState {
    position: Option<u64>,
    capture: Option<Capture>,
}

#[derive(Default)]
struct Capture {
    start: u64,
    bytes: Vec<u8>,
}

/// Sink handed to the zip writer.
///
/// Tracks where the next byte lands so local header offsets can be checked,
/// and keeps the central directory written by `finish` for patching.
struct TrackedSink<W> {
    inner: W,
    state: Rc<RefCell<SinkState>>,
}

impl<W: Seek> TrackedSink<W> {
    fn position(&mut self) -> io::Result<u64> {
        let known = self.state.borrow().position;
        match known {
            Some(position) => Ok(position),
            None => {
                let position = self.inner.stream_position()?;
                self.state.borrow_mut().position = Some(position);
                Ok(position)
            }
        }
    }
}

impl<W: Write + Seek> Write for TrackedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.position()?;
        let n = self.inner.write(buf)?;
        let mut state = self.state.borrow_mut();
        state.position = Some(start + n as u64);
        if let Some(capture) = state.capture.as_mut() {
            // A seek elsewhere starts a new run
            if capture.start + capture.bytes.len() as u64 != start {
                capture.start = start;
                capture.bytes.clear();
            }
            capture.bytes.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for TrackedSink<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        self.state.borrow_mut().position = Some(position);
        Ok(position)
    }
}

const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const CENTRAL_HEADER_LEN: usize = 46;
const END_RECORD_SIGNATURE: u32 = 0x0605_4b50;
const END_RECORD_LEN: usize = 22;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: usize = 20;
const ZIP64_END_RECORD_SIGNATURE: u32 = 0x0606_4b50;

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_le_bytes(bytes.get(at..at + 8)?.try_into().ok()?))
}

/// Location of the central directory found through the end records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CentralDirectory {
    offset: u64,
    size: u64,
}

/// Read the end of central directory record (and its Zip64 counterpart)
/// at the tail of `bytes`, which was written starting at `start`
fn locate_central_directory(bytes: &[u8], start: u64) -> Option<CentralDirectory> {
    let end = bytes.len().checked_sub(END_RECORD_LEN)?;
    if read_u32(bytes, end)? != END_RECORD_SIGNATURE {
        return None;
    }
    let size = read_u32(bytes, end + 12)?;
    let offset = read_u32(bytes, end + 16)?;
    if size != u32::MAX && offset != u32::MAX {
        return Some(CentralDirectory {
            offset: offset.into(),
            size: size.into(),
        });
    }

    let locator = end.checked_sub(ZIP64_LOCATOR_LEN)?;
    if read_u32(bytes, locator)? != ZIP64_LOCATOR_SIGNATURE {
        return None;
    }
    let record = read_u64(bytes, locator + 8)?.checked_sub(start)?;
    let record = usize::try_from(record).ok()?;
    if read_u32(bytes, record)? != ZIP64_END_RECORD_SIGNATURE {
        return None;
    }
    Some(CentralDirectory {
        offset: read_u64(bytes, record + 48)?,
        size: read_u64(bytes, record + 40)?,
    })
}

/// Offsets, relative to the start of `directory`, of the external attribute
/// fields of the entries named in `names`
fn attribute_fields(directory: &[u8], names: &HashSet<String>) -> Vec<(usize, u32)> {
    let mut fields = Vec::new();
    let mut at = 0;
    while read_u32(directory, at) == Some(CENTRAL_HEADER_SIGNATURE) {
        let (Some(name_len), Some(extra_len), Some(comment_len), Some(attr)) = (
            read_u16(directory, at + 28),
            read_u16(directory, at + 30),
            read_u16(directory, at + 32),
            read_u32(directory, at + 38),
        ) else {
            break;
        };
        let name_start = at + CENTRAL_HEADER_LEN;
        let Some(name) = directory.get(name_start..name_start + usize::from(name_len)) else {
            break;
        };
        if std::str::from_utf8(name).is_ok_and(|name| names.contains(name)) {
            fields.push((at + 38, attr));
        }
        at = name_start + usize::from(name_len) + usize::from(extra_len) + usize::from(comment_len);
    }
    fields
}

/// Zip archive writer using deflate compression.
///
/// With `zip_symlinks` a symlink is stored as a link entry holding its target
/// string; without it the link is materialized, expanding links to
/// directories into their contents.
///
/// Directory entries, and link entries pointing at directories, carry the
/// MS-DOS directory attribute. The zip writer only records Unix modes, so the
/// attribute is patched into the central directory when the archive is
/// finished.
pub struct ZipArchive<W: Write + Seek> {
    writer: Option<ZipWriter<TrackedSink<W>>>,
    sink: Rc<RefCell<SinkState>>,
    dos_directories: HashSet<String>,
    zip_symlinks: bool,
    zip_64: bool,
    entries: usize,
}

impl<W: Write + Seek> ZipArchive<W> {
    /// Start a zip archive on `sink`
    pub fn new(sink: W, zip_symlinks: bool, zip_64: bool) -> Self {
        debug!(
            "opening zip archive (symlinks: {}, zip64: {})",
            zip_symlinks, zip_64
        );
        let state = Rc::new(RefCell::new(SinkState::default()));
        let sink = TrackedSink {
            inner: sink,
            state: state.clone(),
        };
        ZipArchive {
            writer: Some(ZipWriter::new(sink)),
            sink: state,
            dos_directories: HashSet::new(),
            zip_symlinks,
            zip_64,
            entries: 0,
        }
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<TrackedSink<W>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("Zip archive is already finished".to_string()))
    }

    /// Check the limits of a zip without Zip64 before the next entry
    fn count_entry(&mut self) -> Result<()> {
        if !self.zip_64 {
            if self.entries >= ZIP_FILECOUNT_LIMIT {
                return Err(Error::LargeZip("Files count".to_string()));
            }
            let offset = self.sink.borrow().position.unwrap_or(0);
            if offset > ZIP64_LIMIT {
                return Err(Error::LargeZip("Zipfile size".to_string()));
            }
        }
        self.entries += 1;
        Ok(())
    }

    fn file_options(&self, info: &ZipEntryInfo) -> Result<SimpleFileOptions> {
        if !self.zip_64 && info.size > ZIP64_LIMIT {
            return Err(Error::LargeZip(format!("File size of {:?}", info.name)));
        }
        // Compression may grow the data, so Zip64 headers are reserved early
        let large = self.zip_64 && info.size + info.size / 20 > ZIP64_LIMIT;
        Ok(SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(info.modified)
            .unix_permissions(info.unix_mode())
            .large_file(large))
    }

    fn write_directory(&mut self, info: &ZipEntryInfo) -> Result<()> {
        self.count_entry()?;
        let options = SimpleFileOptions::default()
            .last_modified_time(info.modified)
            .unix_permissions(info.unix_mode());
        self.writer()?.add_directory(info.name.clone(), options)?;
        if info.external_attr & MSDOS_DIRECTORY != 0 {
            self.dos_directories.insert(info.name.clone());
        }
        Ok(())
    }

    /// Write the file or directory `source` resolves to
    fn write_path(&mut self, source: &Path, target: &Path) -> Result<()> {
        let info = ZipEntryInfo::from_file(source, target)?;
        if info.is_dir() {
            return self.write_directory(&info);
        }

        self.count_entry()?;
        let options = self.file_options(&info)?;
        let mut file = File::open(source)?;
        let writer = self.writer()?;
        writer.start_file(info.name, options)?;
        io::copy(&mut file, writer)?;
        Ok(())
    }

    fn write_symlink(
        &mut self,
        source: &Path,
        link: &EntryMetadata,
        link_target: &Path,
        target: &Path,
    ) -> Result<()> {
        let name = normalize_name(target);
        let options = SimpleFileOptions::default()
            .last_modified_time(DateTime::default())
            .unix_permissions(link.mode & 0xFFFF);
        self.count_entry()?;
        self.writer()?.add_symlink(
            name.clone(),
            link_target.to_string_lossy().into_owned(),
            options,
        )?;
        if source.is_dir() {
            self.dos_directories.insert(name);
        }
        Ok(())
    }

    /// Set the MS-DOS directory attribute on the recorded entries and check
    /// the central directory against the limits of a zip without Zip64
    fn patch_central_directory(&self, sink: &mut W) -> Result<()> {
        let Some(capture) = self.sink.borrow_mut().capture.take() else {
            return Ok(());
        };
        let directory =
            locate_central_directory(&capture.bytes, capture.start).ok_or_else(|| {
                Error::InvalidArgument(
                    "Zip writer produced no end of central directory record".to_string(),
                )
            })?;
        if !self.zip_64 {
            if directory.offset > ZIP64_LIMIT {
                return Err(Error::LargeZip("Central directory offset".to_string()));
            }
            if directory.size > ZIP64_LIMIT {
                return Err(Error::LargeZip("Central directory size".to_string()));
            }
        }
        if self.dos_directories.is_empty() {
            return Ok(());
        }

        let relative = directory
            .offset
            .checked_sub(capture.start)
            .and_then(|relative| usize::try_from(relative).ok())
            .and_then(|relative| capture.bytes.get(relative..))
            .ok_or_else(|| {
                Error::InvalidArgument("Central directory was not captured".to_string())
            })?;
        for (field, attr) in attribute_fields(relative, &self.dos_directories) {
            sink.seek(SeekFrom::Start(directory.offset + field as u64))?;
            sink.write_all(&(attr | MSDOS_DIRECTORY).to_le_bytes())?;
        }
        sink.seek(SeekFrom::End(0))?;
        trace!(
            "marked {} zip entries as MS-DOS directories",
            self.dos_directories.len()
        );
        Ok(())
    }

    /// Materialize a link to a directory by walking what it points at
    fn write_linked_directory(&mut self, source: &Path, target: &Path) -> Result<()> {
        for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source).map_err(|_| {
                Error::InvalidArgument(format!(
                    "Walked path {:?} escapes {:?}",
                    entry.path(),
                    source
                ))
            })?;
            let name = target.join(relative);
            if entry.file_type().is_dir() {
                if fs::read_dir(entry.path())?.next().is_none() {
                    self.write_path(entry.path(), &name)?;
                }
            } else {
                self.write_path(entry.path(), &name)?;
            }
        }
        Ok(())
    }
}

impl<W: Write + Seek> Backend for ZipArchive<W> {
    fn add_entry(&mut self, source: &Path, target: &Path) -> Result<()> {
        let link = match EntryMetadata::from_path(source) {
            Ok(meta) => match meta.kind.clone() {
                EntryKind::Symlink(link_target) => Some((meta, link_target)),
                _ => None,
            },
            Err(err) => {
                debug!(
                    "cannot lstat {:?}, treating it as a regular file: {}",
                    source, err
                );
                None
            }
        };

        match link {
            Some((meta, link_target)) if self.zip_symlinks => {
                self.write_symlink(source, &meta, &link_target, target)
            }
            Some(_) if source.is_dir() => self.write_linked_directory(source, target),
            _ => self.write_path(source, target),
        }
    }

    fn add_bytes_entry(&mut self, reference: &Path, data: &[u8], target: &Path) -> Result<()> {
        let mut info = ZipEntryInfo::from_file(reference, target)?;
        if info.is_dir() {
            if !data.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "Cannot store {} bytes in directory entry {:?}",
                    data.len(),
                    info.name
                )));
            }
            return self.write_directory(&info);
        }

        info.size = data.len() as u64;
        self.count_entry()?;
        let options = self.file_options(&info)?;
        let writer = self.writer()?;
        writer.start_file(info.name, options)?;
        writer.write_all(data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            self.sink.borrow_mut().capture = Some(Capture::default());
            let mut sink = writer.finish()?.inner;
            self.patch_central_directory(&mut sink)?;
            sink.flush()?;
            debug!("zip archive finished with {} entries", self.entries);
        }
        Ok(())
    }
}

//! Adapter from the writer contract onto a general archive library

use crate::error::{Error, Result};
use crate::metadata::{EntryKind, EntryMetadata};
use crate::writer::Backend;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of the chunks file bodies are streamed in
const CHUNK_SIZE: usize = 64 * 1024;

/// Primitive operations of an archive library able to write arbitrary
/// format/filter combinations.
///
/// [`crate::Libarchive`] is the production implementation; tests substitute
/// their own.
pub trait ArchiveLibrary {
    /// Start a new entry named `pathname`
    fn write_header(&mut self, pathname: &str, meta: &EntryMetadata) -> Result<()>;

    /// Append body bytes to the current entry
    fn write_data(&mut self, data: &[u8]) -> Result<()>;

    /// Finalize the archive and release the library handle
    fn close(&mut self) -> Result<()>;
}

/// Writer backend driving an [`ArchiveLibrary`].
///
/// Like the tar backend, symlinks are archived as links and directories are
/// added without their children.
pub struct ExternalArchive<L: ArchiveLibrary> {
    library: L,
}

impl<L: ArchiveLibrary> ExternalArchive<L> {
    /// Wrap an opened library handle
    pub fn new(library: L) -> Self {
        ExternalArchive { library }
    }
}

fn pathname(target: &Path) -> Result<String> {
    let pathname = target
        .to_str()
        .ok_or_else(|| Error::InvalidArgument("Path contains invalid UTF-8".to_string()))?;
    if cfg!(windows) {
        Ok(pathname.replace('\\', "/"))
    } else {
        Ok(pathname.to_string())
    }
}

impl<L: ArchiveLibrary> Backend for ExternalArchive<L> {
    fn add_entry(&mut self, source: &Path, target: &Path) -> Result<()> {
        let meta = EntryMetadata::from_path(source)?;
        self.library.write_header(&pathname(target)?, &meta)?;
        if meta.kind != EntryKind::File {
            return Ok(());
        }

        let mut file = File::open(source)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            self.library.write_data(&buffer[..n])?;
        }
        Ok(())
    }

    fn add_bytes_entry(&mut self, reference: &Path, data: &[u8], target: &Path) -> Result<()> {
        let mut meta = EntryMetadata::from_path(reference)?;
        meta.size = data.len() as u64;
        self.library.write_header(&pathname(target)?, &meta)?;
        if !data.is_empty() {
            self.library.write_data(data)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.library.close()
    }
}

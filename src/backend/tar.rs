//! Tar backend writing plain, gzip or bzip2 streams

use crate::error::Result;
use crate::format::TarMode;
use crate::writer::Backend;
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tar::{Builder, Header, HeaderMode};

/// Output stream below the tar builder
enum Stream<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
}

impl<W: Write> Stream<W> {
    fn new(sink: W, mode: TarMode) -> Self {
        match mode {
            TarMode::Plain => Stream::Plain(sink),
            TarMode::Gzip(level) => {
                Stream::Gzip(GzEncoder::new(sink, flate2::Compression::new(level)))
            }
            TarMode::Bzip2(level) => {
                Stream::Bzip2(BzEncoder::new(sink, bzip2::Compression::new(level)))
            }
        }
    }

    /// Write the compressor trailer, if any, and flush the sink
    fn try_finish(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(sink) => sink.flush(),
            Stream::Gzip(encoder) => {
                encoder.try_finish()?;
                encoder.get_mut().flush()
            }
            Stream::Bzip2(encoder) => {
                encoder.try_finish()?;
                encoder.get_mut().flush()
            }
        }
    }
}

impl<W: Write> Write for Stream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(sink) => sink.write(buf),
            Stream::Gzip(encoder) => encoder.write(buf),
            Stream::Bzip2(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(sink) => sink.flush(),
            Stream::Gzip(encoder) => encoder.flush(),
            Stream::Bzip2(encoder) => encoder.flush(),
        }
    }
}

/// Tar archive writer.
///
/// Symlinks are archived as links, never dereferenced, and directories are
/// added without their children.
pub struct TarArchive<W: Write> {
    builder: Builder<Stream<W>>,
}

impl<W: Write> TarArchive<W> {
    /// Start a tar stream on `sink`
    pub fn new(sink: W, mode: TarMode) -> Self {
        debug!("opening tar stream ({:?})", mode);
        let mut builder = Builder::new(Stream::new(sink, mode));
        builder.follow_symlinks(false);
        builder.mode(HeaderMode::Complete);
        TarArchive { builder }
    }
}

impl<W: Write> Backend for TarArchive<W> {
    fn add_entry(&mut self, source: &Path, target: &Path) -> Result<()> {
        self.builder.append_path_with_name(source, target)?;
        Ok(())
    }

    fn add_bytes_entry(&mut self, reference: &Path, data: &[u8], target: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(reference)?;
        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&meta, HeaderMode::Complete);
        if meta.file_type().is_symlink() {
            // Link entries have no body; long targets go through a GNU
            // long-link record
            if !data.is_empty() {
                debug!(
                    "dropping {} bytes for link entry {:?}",
                    data.len(),
                    target
                );
            }
            header.set_size(0);
            self.builder
                .append_link(&mut header, target, fs::read_link(reference)?)?;
            return Ok(());
        }
        header.set_size(data.len() as u64);
        self.builder.append_data(&mut header, target, data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.builder.finish()?;
        self.builder.get_mut().try_finish()?;
        Ok(())
    }
}

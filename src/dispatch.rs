//! Selecting a backend for a format identifier

use crate::backend::{ArchiveLibrary, ExternalArchive, TarArchive, ZipArchive};
use crate::error::{Error, Result};
use crate::format::{FormatSpec, TarMode, tar_mode};
use crate::libarchive::Libarchive;
use crate::options::ArchiveOptions;
use crate::writer::{ArchiveWriter, Backend, scoped};
use std::io::{Seek, Write};
use std::path::Path;

/// Open an archive writer for `format` on `sink`.
///
/// `zip` gets the zip backend and `tar.bz2` the tar backend; everything else
/// is written through libarchive, using the format table entry for `format`
/// unless `options` carries explicit libarchive settings.
///
/// `name` identifies the archive in diagnostics. Every entry is placed below
/// `arcroot`.
///
/// # Examples
///
/// ```no_run
/// use relocpack::{ArchiveOptions, archive};
/// use std::fs::File;
///
/// let mut file = File::create("env.tar.gz")?;
/// let mut writer = archive(&mut file, "env.tar.gz", "env", "tar.gz", &ArchiveOptions::default())?;
/// writer.add("/opt/env/bin/python", "bin/python")?;
/// writer.add_bytes("/opt/env/bin/activate", b"# relocated\n", "bin/activate")?;
/// writer.finish()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn archive<'a, W, P>(
    sink: W,
    name: &str,
    arcroot: P,
    format: &str,
    options: &ArchiveOptions,
) -> Result<ArchiveWriter<'a>>
where
    W: Write + Seek + 'a,
    P: AsRef<Path>,
{
    archive_with(sink, name, arcroot, format, options, |sink, spec| {
        Libarchive::open(sink, spec)
    })
}

/// Like [`archive`], opening the libarchive side with `open_library`
pub fn archive_with<'a, W, P, L, F>(
    sink: W,
    name: &str,
    arcroot: P,
    format: &str,
    options: &ArchiveOptions,
    open_library: F,
) -> Result<ArchiveWriter<'a>>
where
    W: Write + Seek + 'a,
    P: AsRef<Path>,
    L: ArchiveLibrary + 'a,
    F: FnOnce(W, &FormatSpec) -> Result<L>,
{
    let backend: Box<dyn Backend + 'a> = match format {
        "zip" => Box::new(ZipArchive::new(
            sink,
            options.zip_symlinks,
            options.zip_64,
        )),
        "tar.bz2" => {
            let mode = tar_mode(format).unwrap_or("w:bz2");
            Box::new(TarArchive::new(
                sink,
                TarMode::parse(mode, options.compress_level)?,
            ))
        }
        _ => {
            let spec = resolve_spec(format, options)?;
            Box::new(ExternalArchive::new(open_library(sink, &spec)?))
        }
    };
    debug!("{}: writing {} archive", name, format);
    Ok(ArchiveWriter::new(name, arcroot.as_ref(), backend))
}

/// Resolve the libarchive settings for `format`.
///
/// An explicit, non-empty `libarchive_options` wins over the format table.
pub fn resolve_spec(format: &str, options: &ArchiveOptions) -> Result<FormatSpec> {
    let mode = options
        .libarchive_options
        .as_deref()
        .filter(|options| !options.is_empty())
        .or_else(|| tar_mode(format));

    if mode.is_none() && options.libarchive_filter.is_none() && options.libarchive_format.is_none()
    {
        return Err(Error::UnsupportedFormat {
            format: format.to_string(),
            supported: Vec::new(),
        });
    }

    Ok(FormatSpec {
        options: mode.map(String::from),
        compress_level: options.compress_level,
        filter_name: options.libarchive_filter.clone(),
        format_name: options.libarchive_format.clone(),
    })
}

/// Write a complete archive: open it, run `body`, and finish it even when
/// `body` fails
pub fn write_archive<W, P, T, F>(
    sink: W,
    name: &str,
    arcroot: P,
    format: &str,
    options: &ArchiveOptions,
    body: F,
) -> Result<T>
where
    W: Write + Seek,
    P: AsRef<Path>,
    F: FnOnce(&mut ArchiveWriter<'_>) -> Result<T>,
{
    scoped(archive(sink, name, arcroot, format, options)?, body)
}

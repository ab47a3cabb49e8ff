//! Archive format identifiers and their resolved writer settings

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Mode or option string for each user-facing format identifier.
///
/// The `w...` entries are tar stream modes, the `tar.zstd` entry is a
/// libarchive option string.
pub const TAR_MODES: &[(&str, &str)] = &[
    ("tar.gz", "w:gz"),
    ("tgz", "w:gz"),
    ("tar.bz2", "w:bz2"),
    ("tbz2", "w:bz2"),
    ("tar", "w"),
    ("tar.zstd", "zstd:compression-level=22"),
];

/// Libarchive format used when the caller names none (restricted pax)
pub const DEFAULT_LIBRARY_FORMAT: &str = "paxr";

/// Filters that understand libarchive's `compression-level` option
const LEVELLED_FILTERS: &[&str] = &["bzip2", "gzip", "lz4", "lzip", "lzma", "xz", "zstd"];

/// Look up the mode/options string for a format identifier
pub fn tar_mode(format: &str) -> Option<&'static str> {
    TAR_MODES
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, mode)| *mode)
}

/// Map a tar stream mode to the libarchive filter implementing it.
///
/// Returns `None` when `mode` is not a tar stream mode, `Some(None)` for the
/// uncompressed mode.
fn stream_mode_filter(mode: &str) -> Option<Option<&'static str>> {
    match mode {
        "w" | "w:" => Some(None),
        "w:gz" => Some(Some("gzip")),
        "w:bz2" => Some(Some("bzip2")),
        "w:xz" => Some(Some("xz")),
        _ => None,
    }
}

/// Tar stream mode with its compression level.
///
/// The plain mode has no level at all; the compressed modes always carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarMode {
    /// Uncompressed tar (`w`)
    Plain,
    /// Gzip-compressed tar (`w:gz`), level 0-9
    Gzip(u32),
    /// Bzip2-compressed tar (`w:bz2`), level 1-9
    Bzip2(u32),
}

impl TarMode {
    /// Parse a tar stream mode, attaching `level` to compressed modes
    pub fn parse(mode: &str, level: u32) -> Result<Self> {
        let tar_mode = match mode {
            "w" | "w:" => TarMode::Plain,
            "w:gz" => TarMode::Gzip(level),
            "w:bz2" => TarMode::Bzip2(level),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Unsupported tar mode: {mode:?}"
                )));
            }
        };
        tar_mode.validate()?;
        Ok(tar_mode)
    }

    fn validate(self) -> Result<()> {
        match self {
            TarMode::Plain => Ok(()),
            TarMode::Gzip(level) if level <= 9 => Ok(()),
            TarMode::Bzip2(level) if (1..=9).contains(&level) => Ok(()),
            TarMode::Gzip(level) | TarMode::Bzip2(level) => Err(Error::InvalidArgument(format!(
                "Compression level {level} is out of range for {self:?}"
            ))),
        }
    }

    /// Compression level, absent for the plain mode
    pub fn level(&self) -> Option<u32> {
        match self {
            TarMode::Plain => None,
            TarMode::Gzip(level) | TarMode::Bzip2(level) => Some(*level),
        }
    }
}

/// Settings for the libarchive-backed writer, resolved once at dispatch time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    /// Tar stream mode or libarchive option string
    pub options: Option<String>,
    /// Compression level applied to filters that accept one
    pub compress_level: u32,
    /// Explicit libarchive filter name
    pub filter_name: Option<String>,
    /// Explicit libarchive format name
    pub format_name: Option<String>,
}

impl FormatSpec {
    /// Libarchive format name to write
    pub fn format(&self) -> &str {
        self.format_name.as_deref().unwrap_or(DEFAULT_LIBRARY_FORMAT)
    }

    /// Libarchive filter to apply, if any.
    ///
    /// An explicit filter name wins. Otherwise tar stream modes map to their
    /// filter and a `module:option` string names its module, unless that
    /// module is the archive format itself.
    pub fn filter(&self) -> Option<&str> {
        if let Some(name) = self.filter_name.as_deref() {
            return Some(name);
        }
        let options = self.options.as_deref()?;
        if let Some(filter) = stream_mode_filter(options) {
            return filter;
        }
        let module = options.split(',').next()?.split_once(':')?.0;
        if module.is_empty() || module == self.format() {
            None
        } else {
            Some(module)
        }
    }

    /// Option string to hand to `archive_write_set_options`, if any
    pub fn library_options(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(options) = self.options.as_deref() {
            if stream_mode_filter(options).is_none() {
                parts.push(options.to_string());
            }
        }

        if let Some(filter) = self.filter() {
            let has_level = parts.iter().any(|p| p.contains("compression-level"));
            if !has_level && LEVELLED_FILTERS.contains(&filter) {
                parts.push(format!(
                    "{filter}:compression-level={}",
                    self.compress_level
                ));
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        }
    }
}

/// Supplier of the filter and format names the archive library can write.
///
/// Implemented outside this crate; the names are only used to validate
/// user-facing format selections.
pub trait FormatCatalog {
    /// Names accepted by `archive_write_add_filter_by_name`
    fn filter_names(&self) -> Vec<String>;
    /// Names accepted by `archive_write_set_format_by_name`
    fn format_names(&self) -> Vec<String>;
}

/// All format identifiers that can be produced given `catalog`, sorted
pub fn supported_formats(catalog: &dyn FormatCatalog) -> Vec<String> {
    let mut formats = BTreeSet::new();
    formats.insert("zip".to_string());
    formats.extend(TAR_MODES.iter().map(|(name, _)| name.to_string()));
    formats.extend(
        catalog
            .filter_names()
            .into_iter()
            .map(|filter| format!("tar.{filter}")),
    );
    formats.into_iter().collect()
}

/// Validate a user-supplied format identifier.
///
/// On success returns the libarchive filter the caller must pass as
/// `libarchive_filter` for `tar.<filter>` identifiers missing from
/// [`TAR_MODES`], or `None` when the identifier needs no override.
pub fn check_format(format: &str, catalog: &dyn FormatCatalog) -> Result<Option<String>> {
    if format == "zip" || tar_mode(format).is_some() {
        return Ok(None);
    }
    if let Some(filter) = format.strip_prefix("tar.") {
        if catalog.filter_names().iter().any(|name| name == filter) {
            return Ok(Some(filter.to_string()));
        }
    }
    Err(Error::UnsupportedFormat {
        format: format.to_string(),
        supported: supported_formats(catalog),
    })
}

/// Validate explicit libarchive filter/format overrides against `catalog`
pub fn check_library_names(
    filter_name: Option<&str>,
    format_name: Option<&str>,
    catalog: &dyn FormatCatalog,
) -> Result<()> {
    if let Some(filter) = filter_name {
        let filters = catalog.filter_names();
        if !filters.iter().any(|name| name == filter) {
            return Err(Error::InvalidArgument(format!(
                "Unknown libarchive filter {filter:?}, expected one of: {}",
                filters.join(", ")
            )));
        }
    }
    if let Some(format) = format_name {
        let formats = catalog.format_names();
        if !formats.iter().any(|name| name == format) {
            return Err(Error::InvalidArgument(format!(
                "Unknown libarchive format {format:?}, expected one of: {}",
                formats.join(", ")
            )));
        }
    }
    Ok(())
}

//! Writer configuration

/// Options controlling how an archive is written.
///
/// Start from [`ArchiveOptions::default`] and override with the builder
/// methods:
///
/// ```
/// use relocpack::ArchiveOptions;
///
/// let options = ArchiveOptions::new().compress_level(9).zip_symlinks(true);
/// assert!(options.zip_64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Libarchive format name overriding the default restricted pax
    pub libarchive_format: Option<String>,
    /// Libarchive filter name overriding the one implied by the format
    pub libarchive_filter: Option<String>,
    /// Libarchive option string overriding the format table entry
    pub libarchive_options: Option<String>,
    /// Compression level for compressed formats
    pub compress_level: u32,
    /// Store symlinks as links in zip archives instead of materializing them
    pub zip_symlinks: bool,
    /// Allow Zip64 extensions for large zip archives
    pub zip_64: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            libarchive_format: None,
            libarchive_filter: None,
            libarchive_options: None,
            compress_level: 4,
            zip_symlinks: false,
            zip_64: true,
        }
    }
}

impl ArchiveOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the libarchive format name
    pub fn libarchive_format(mut self, format: impl Into<String>) -> Self {
        self.libarchive_format = Some(format.into());
        self
    }

    /// Set the libarchive filter name
    pub fn libarchive_filter(mut self, filter: impl Into<String>) -> Self {
        self.libarchive_filter = Some(filter.into());
        self
    }

    /// Set the libarchive option string
    pub fn libarchive_options(mut self, options: impl Into<String>) -> Self {
        self.libarchive_options = Some(options.into());
        self
    }

    /// Set the compression level
    pub fn compress_level(mut self, level: u32) -> Self {
        self.compress_level = level;
        self
    }

    /// Store symlinks as links in zip archives
    pub fn zip_symlinks(mut self, enabled: bool) -> Self {
        self.zip_symlinks = enabled;
        self
    }

    /// Allow Zip64 extensions
    pub fn zip_64(mut self, enabled: bool) -> Self {
        self.zip_64 = enabled;
        self
    }
}

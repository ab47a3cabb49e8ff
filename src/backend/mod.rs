//! Format-specific writer backends

mod external;
mod tar;
mod zip;

pub use self::external::{ArchiveLibrary, ExternalArchive};
pub use self::tar::TarArchive;
pub use self::zip::{
    MSDOS_DIRECTORY, ZIP_FILECOUNT_LIMIT, ZIP64_LIMIT, ZipArchive, ZipEntryInfo, normalize_name,
};

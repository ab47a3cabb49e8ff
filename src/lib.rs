//! Pack a filesystem tree into a single relocatable archive
//!
//! This crate writes tar (plain, gzip, bzip2), zip and libarchive-backed
//! archives, including zstd-compressed tar, through one writer interface.
//! Callers enumerate the tree themselves and hand each path to the writer;
//! every entry lands below a common archive root.
//!
//! # Examples
//!
//! ## Writing an archive
//!
//! ```no_run
//! use relocpack::{ArchiveOptions, archive};
//! use std::fs::File;
//!
//! let mut file = File::create("env.zip")?;
//! let options = ArchiveOptions::new().zip_symlinks(true);
//! let mut writer = archive(&mut file, "env.zip", "env", "zip", &options)?;
//!
//! writer.add("/opt/env/lib", "lib")?;
//! writer.add("/opt/env/lib/libfoo.so", "lib/libfoo.so")?;
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Scoped writing
//!
//! ```no_run
//! use relocpack::{ArchiveOptions, write_archive};
//! use std::fs::File;
//!
//! let mut file = File::create("env.tar.zstd")?;
//! write_archive(&mut file, "env.tar.zstd", "env", "tar.zstd", &ArchiveOptions::default(), |writer| {
//!     writer.add("/opt/env/bin", "bin")?;
//!     writer.add_bytes("/opt/env/bin/activate", b"#!/bin/sh\n", "bin/activate")
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]

#[cfg(feature = "log")]
#[macro_use(debug, trace, warn)]
extern crate log;

#[cfg(not(feature = "log"))]
#[macro_use]
mod macros {
    macro_rules! trace {
        ($($tt:tt)*) => {
            let _ = if false {
                let _ = ::std::format_args!($($tt)*);
            };
        };
    }

    macro_rules! debug {
        ($($tt:tt)*) => {
            trace!($($tt)*)
        };
    }

    macro_rules! warn {
        ($($tt:tt)*) => {
            trace!($($tt)*)
        };
    }
}

mod backend;
mod callbacks;
mod dispatch;
mod entry;
mod error;
mod format;
mod libarchive;
mod metadata;
mod options;
mod writer;

pub use backend::{
    ArchiveLibrary, ExternalArchive, MSDOS_DIRECTORY, TarArchive, ZIP_FILECOUNT_LIMIT,
    ZIP64_LIMIT, ZipArchive, ZipEntryInfo, normalize_name,
};
pub use dispatch::{archive, archive_with, resolve_spec, write_archive};
pub use error::{Error, Result};
pub use format::{
    DEFAULT_LIBRARY_FORMAT, FormatCatalog, FormatSpec, TAR_MODES, TarMode, check_format,
    check_library_names, supported_formats, tar_mode,
};
pub use libarchive::Libarchive;
pub use metadata::{EntryKind, EntryMetadata};
pub use options::ArchiveOptions;
pub use writer::{ArchiveWriter, Backend, scoped};

/// Returns the version string of the underlying libarchive library
pub fn libarchive_version() -> String {
    unsafe {
        let ptr = libarchive2_sys::archive_version_string();
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

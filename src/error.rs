//! Error types for archive writing

use std::ffi::CStr;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for archive operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error reported by libarchive
    #[error("libarchive error (code {code}): {message}")]
    Archive {
        /// Error code from libarchive
        code: i32,
        /// Error message from libarchive
        message: String,
    },
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Error from the zip writer
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Error while walking a linked directory
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    /// The requested archive format cannot be produced
    #[error("unsupported archive format {format:?}{}", supported_hint(.supported))]
    UnsupportedFormat {
        /// The format identifier as given by the caller
        format: String,
        /// Identifiers that would have been accepted, if known
        supported: Vec<String>,
    },
    /// An entry or the entry count exceeds the limits of a zip without Zip64
    #[error("{0} would require ZIP64 extensions")]
    LargeZip(String),
    /// Null pointer error
    #[error("Null pointer error")]
    NullPointer,
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn supported_hint(supported: &[String]) -> String {
    if supported.is_empty() {
        String::new()
    } else {
        format!(", expected one of: {}", supported.join(", "))
    }
}

impl Error {
    /// Create an error from a libarchive archive pointer
    pub(crate) unsafe fn from_archive(archive: *mut libarchive2_sys::archive) -> Self {
        // SAFETY: Caller must ensure archive is a valid pointer
        unsafe {
            let code = libarchive2_sys::archive_errno(archive);
            let msg_ptr = libarchive2_sys::archive_error_string(archive);
            let message = if msg_ptr.is_null() {
                format!("Unknown error (code: {})", code)
            } else {
                CStr::from_ptr(msg_ptr).to_string_lossy().into_owned()
            };

            Error::Archive { code, message }
        }
    }

    /// Check a return code from libarchive and convert to Result
    pub(crate) unsafe fn from_return_code(
        ret: i32,
        archive: *mut libarchive2_sys::archive,
    ) -> Result<i32> {
        if ret < 0 {
            // SAFETY: Caller must ensure archive is a valid pointer
            Err(unsafe { Self::from_archive(archive) })
        } else {
            Ok(ret)
        }
    }
}

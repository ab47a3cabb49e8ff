//! Libarchive-backed archive library

use crate::backend::ArchiveLibrary;
use crate::callbacks::{CallbackWriter, DropFn};
use crate::entry::EntryMut;
use crate::error::{Error, Result};
use crate::format::FormatSpec;
use crate::metadata::EntryMetadata;
use std::ffi::{CString, c_void};
use std::io::Write;
use std::marker::PhantomData;

fn c_string(value: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{value:?} contains null byte")))
}

/// Libarchive write handle streaming into a caller-supplied writer.
///
/// The handle is closed and freed on drop if [`ArchiveLibrary::close`] was
/// never called.
pub struct Libarchive<'a> {
    archive: *mut libarchive2_sys::archive,
    client_data: *mut c_void,
    drop_client: Option<DropFn>,
    _sink: PhantomData<&'a mut ()>,
}

impl<'a> Libarchive<'a> {
    /// Open a libarchive writer on `sink` configured from `spec`
    pub fn open<W: Write + 'a>(sink: W, spec: &FormatSpec) -> Result<Self> {
        let archive = unsafe { libarchive2_sys::archive_write_new() };
        if archive.is_null() {
            return Err(Error::NullPointer);
        }
        let mut library = Libarchive {
            archive,
            client_data: std::ptr::null_mut(),
            drop_client: None,
            _sink: PhantomData,
        };
        library.configure(spec)?;

        let (client_data, write_fn, close_fn, drop_fn) = CallbackWriter::new(sink).into_raw_parts();
        library.client_data = client_data;
        library.drop_client = Some(drop_fn);

        unsafe {
            // SAFETY: the callbacks were created for exactly this client data
            // and share the signatures libarchive expects
            Error::from_return_code(
                libarchive2_sys::archive_write_open(
                    library.archive,
                    client_data,
                    None,
                    Some(std::mem::transmute(write_fn)),
                    Some(std::mem::transmute(close_fn)),
                ),
                library.archive,
            )?;
        }

        debug!(
            "opened libarchive writer (format: {}, filter: {:?})",
            spec.format(),
            spec.filter()
        );
        Ok(library)
    }

    fn configure(&mut self, spec: &FormatSpec) -> Result<()> {
        let format = c_string(spec.format())?;
        unsafe {
            Error::from_return_code(
                libarchive2_sys::archive_write_set_format_by_name(self.archive, format.as_ptr()),
                self.archive,
            )?;
        }

        match spec.filter() {
            Some(filter) => {
                let filter = c_string(filter)?;
                unsafe {
                    Error::from_return_code(
                        libarchive2_sys::archive_write_add_filter_by_name(
                            self.archive,
                            filter.as_ptr(),
                        ),
                        self.archive,
                    )?;
                }
            }
            None => unsafe {
                Error::from_return_code(
                    libarchive2_sys::archive_write_add_filter_none(self.archive),
                    self.archive,
                )?;
            },
        }

        if let Some(options) = spec.library_options() {
            trace!("libarchive options: {}", options);
            let options = c_string(&options)?;
            unsafe {
                Error::from_return_code(
                    libarchive2_sys::archive_write_set_options(self.archive, options.as_ptr()),
                    self.archive,
                )?;
            }
        }
        Ok(())
    }

    /// Close and free the handle, then release the sink
    fn release(&mut self) -> Result<()> {
        let mut result = Ok(());
        if !self.archive.is_null() {
            unsafe {
                let ret = libarchive2_sys::archive_write_close(self.archive);
                result = Error::from_return_code(ret, self.archive).map(|_| ());
                libarchive2_sys::archive_write_free(self.archive);
            }
            self.archive = std::ptr::null_mut();
        }
        if let Some(drop_client) = self.drop_client.take() {
            // SAFETY: libarchive no longer references the client data
            unsafe { drop_client(self.client_data) };
            self.client_data = std::ptr::null_mut();
        }
        result
    }
}

impl ArchiveLibrary for Libarchive<'_> {
    fn write_header(&mut self, pathname: &str, meta: &EntryMetadata) -> Result<()> {
        let entry = EntryMut::from_metadata(pathname, meta)?;
        unsafe {
            Error::from_return_code(
                libarchive2_sys::archive_write_header(self.archive, entry.entry),
                self.archive,
            )?;
        }
        Ok(())
    }

    fn write_data(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let ret = unsafe {
                libarchive2_sys::archive_write_data(
                    self.archive,
                    data.as_ptr() as *const c_void,
                    data.len(),
                )
            };
            if ret < 0 {
                return Err(unsafe { Error::from_archive(self.archive) });
            }
            if ret == 0 {
                // The entry is full; libarchive drops anything past its size
                break;
            }
            data = &data[ret as usize..];
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for Libarchive<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to close libarchive writer: {}", err);
        }
    }
}

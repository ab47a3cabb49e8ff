//! Write callbacks routing libarchive output into a Rust writer

use std::ffi::c_void;
use std::io::Write;
use std::os::raw::c_int;
use std::sync::Mutex;

/// Type for callback cleanup function
pub(crate) type DropFn = unsafe fn(*mut c_void);

const ARCHIVE_OK: c_int = 0;
const ARCHIVE_FATAL: c_int = -30;

/// Sink shared with libarchive through the client data pointer
struct WriteCallbackState<W: Write> {
    writer: W,
}

/// Run `f` on the sink behind `client_data`, or return `None` when the
/// pointer is null or the lock is poisoned.
///
/// # Safety
/// `client_data` must be null or the pointer produced by
/// [`CallbackWriter::into_raw_parts`], not yet released by its drop function.
unsafe fn with_sink<W: Write, T>(
    client_data: *mut c_void,
    f: impl FnOnce(&mut W) -> T,
) -> Option<T> {
    if client_data.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller
    let state = unsafe { &*(client_data as *const Mutex<WriteCallbackState<W>>) };
    let mut guard = state.lock().ok()?;
    Some(f(&mut guard.writer))
}

/// Block writer handed to `archive_write_open2`.
///
/// Besides per-entry blocks, libarchive pushes the compressor trailer and
/// the end-of-archive padding through here from inside
/// `archive_write_close`, before [`close_callback_impl`] runs. A short or
/// failed write must therefore surface as `-1` so the close reports it.
///
/// # Safety
/// Same contract as [`with_sink`].
unsafe extern "C" fn write_callback_impl<W: Write>(
    _archive: *mut libarchive2_sys::archive,
    client_data: *mut c_void,
    buffer: *const c_void,
    length: usize,
) -> isize {
    if length == 0 {
        return if client_data.is_null() { -1 } else { 0 };
    }
    if buffer.is_null() {
        return -1;
    }
    // SAFETY: libarchive owns `buffer` for `length` bytes during this call
    let block = unsafe { std::slice::from_raw_parts(buffer as *const u8, length) };
    // SAFETY: forwarded caller contract
    match unsafe { with_sink::<W, _>(client_data, |sink| sink.write_all(block)) } {
        Some(Ok(())) => length as isize,
        Some(Err(err)) => {
            warn!("archive sink rejected {} bytes: {}", length, err);
            -1
        }
        None => -1,
    }
}

/// Close callback; flushes the sink once libarchive has written its
/// final blocks
///
/// # Safety
/// Same contract as [`with_sink`].
unsafe extern "C" fn close_callback_impl<W: Write>(
    _archive: *mut libarchive2_sys::archive,
    client_data: *mut c_void,
) -> c_int {
    if client_data.is_null() {
        return ARCHIVE_OK;
    }
    // SAFETY: forwarded caller contract
    match unsafe { with_sink::<W, _>(client_data, |sink| sink.flush()) } {
        Some(Ok(())) => ARCHIVE_OK,
        _ => ARCHIVE_FATAL,
    }
}

/// Adapter handing any `Write` implementation to libarchive
pub(crate) struct CallbackWriter<W: Write> {
    state: Box<Mutex<WriteCallbackState<W>>>,
}

impl<W: Write> CallbackWriter<W> {
    /// Create a new callback writer from any type implementing Write
    pub(crate) fn new(writer: W) -> Self {
        CallbackWriter {
            state: Box::new(Mutex::new(WriteCallbackState { writer })),
        }
    }

    /// Leak the state for libarchive.
    ///
    /// Returns the client data pointer, the write and close callbacks as
    /// untyped pointers, and the function that frees the client data.
    pub(crate) fn into_raw_parts(self) -> (*mut c_void, *const c_void, *const c_void, DropFn) {
        let ptr = Box::into_raw(self.state) as *mut c_void;

        unsafe fn drop_fn<W: Write>(ptr: *mut c_void) {
            // SAFETY: ptr was created by Box::into_raw in into_raw_parts
            unsafe {
                let _ = Box::from_raw(ptr as *mut Mutex<WriteCallbackState<W>>);
            }
        }

        // Function pointers travel as void pointers so the callback signatures
        // do not depend on how the bindings spell ssize_t
        (
            ptr,
            write_callback_impl::<W> as *const c_void,
            close_callback_impl::<W> as *const c_void,
            drop_fn::<W>,
        )
    }
}

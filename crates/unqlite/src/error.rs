//! Error types for UnQLite operations.

use crate::ffi;
use std::ffi::c_int;
use std::fmt;

/// Convenient alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all UnQLite operations.
#[derive(Debug)]
pub enum Error {
    /// The requested key or Jx9 variable does not exist.
    NotFound,
    /// A stored blob or Jx9 value did not match the requested Rust type.
    Type {
        /// Name of the type the caller asked for.
        expected: &'static str,
    },
    /// A key, variable or function name contained an interior NUL byte and
    /// could not be passed to the engine as a C string.
    Name(std::ffi::NulError),
    /// JSON (de)serialization failed in one of the serde helpers.
    Json(serde_json::Error),
    /// Any other non-OK status reported by the engine. The code is the
    /// engine's own, propagated unchanged; the message comes from the
    /// engine's error log when one is available.
    Engine {
        /// Native UnQLite status code.
        code: i32,
        /// Text read from the engine's error log, if any.
        message: Option<String>,
    },
}

impl Error {
    /// Build an error from a non-OK engine status code, pulling the matching
    /// error log off the database handle.
    ///
    /// Compile failures are reported through the Jx9 compiler log rather
    /// than the database log, so the verb is chosen by status code.
    ///
    /// # Safety
    /// `db` must be a valid open database handle.
    pub(crate) unsafe fn from_code(db: *mut ffi::unqlite, code: c_int) -> Self {
        if code == ffi::UNQLITE_NOTFOUND {
            return Error::NotFound;
        }
        let verb = if code == ffi::UNQLITE_COMPILE_ERR {
            ffi::UNQLITE_CONFIG_JX9_ERR_LOG
        } else {
            ffi::UNQLITE_CONFIG_ERR_LOG
        };
        let message = unsafe { read_error_log(db, verb) };
        Error::Engine { code, message }
    }

    /// True when the error is the engine's "no such key" status.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// The native status code, when the error originated in the engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Engine { code, .. } => Some(*code),
            Error::NotFound => Some(ffi::UNQLITE_NOTFOUND),
            _ => None,
        }
    }
}

/// Fetch one of the engine's error logs as an owned string.
///
/// Returns `None` when the log query fails or the log is empty. The trailing
/// newline the engine appends to log entries is already trimmed by the
/// config forwarder.
unsafe fn read_error_log(db: *mut ffi::unqlite, verb: c_int) -> Option<String> {
    let mut buf: *mut std::ffi::c_char = std::ptr::null_mut();
    let mut len: c_int = 0;
    // SAFETY: db is valid per caller contract, buf/len are valid out-params
    let rc = unsafe { ffi::config_err_log(db, verb, &mut buf, &mut len) };
    if rc != ffi::UNQLITE_OK || len <= 0 || buf.is_null() {
        return None;
    }
    // SAFETY: the engine reported `len` readable bytes at `buf`
    let bytes = unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), len as usize) };
    Some(String::from_utf8_lossy(bytes).into_owned())
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "key not found"),
            Error::Type { expected } => write!(f, "value cannot be read as {expected}"),
            Error::Name(e) => write!(f, "invalid name: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Engine {
                code,
                message: Some(msg),
            } => write!(f, "unqlite error {code}: {msg}"),
            Error::Engine {
                code,
                message: None,
            } => write!(f, "unqlite error {code}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Name(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(e: std::ffi::NulError) -> Self {
        Error::Name(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

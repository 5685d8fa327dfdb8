//! Safe Rust bindings for the UnQLite embedded NoSQL database engine.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! UnQLite is a serverless, transactional key/value and document store with
//! an embedded scripting language (Jx9) for querying. This crate wraps the
//! bundled C engine behind a safe API:
//!
//! - [`Connection`] — open a database, raw and typed key/value access,
//!   manual or scoped transactions
//! - [`Vm`] — compile and run Jx9 programs, push variables in, pull results
//!   out, redirect program output into a closure
//! - [`Collection`] — the Jx9 document store: JSON records with
//!   engine-assigned ids, plus filtered queries
//! - [`expr`] — a small builder for Jx9 filter expressions
//!
//! # Example
//!
//! ```rust,ignore
//! use unqlite::{Connection, Value};
//! use serde_json::json;
//!
//! let db = Connection::open_memory()?;
//!
//! // Key/value
//! db.put_str("greeting", "hello")?;
//! assert_eq!(db.get_str("greeting")?, "hello");
//!
//! // Document store
//! let users = db.collection("users")?;
//! users.append(&Value::from_json(json!({"name": "Huey", "age": 3})))?;
//! let kids = users.fetch_where(&unqlite::expr::field("age").lt(10))?;
//! # Ok::<(), unqlite::Error>(())
//! ```
//!
//! # Thread safety
//!
//! [`Connection`] is `Send + Sync`: every call locks an internal mutex
//! around the raw handle, so it is safe to share regardless of how the
//! engine itself was compiled. [`Vm`] and [`Collection`] borrow their
//! connection and stay on the thread that created them.

pub mod collection;
pub mod connection;
pub mod error;
pub mod expr;
pub mod ffi;
pub mod value;
pub mod vm;

pub use collection::Collection;
pub use connection::{Config, Connection, Location, OpenFlags};
pub use error::{Error, Result};
pub use expr::{Expr, field};
pub use value::Value;
pub use vm::Vm;

use std::ffi::CStr;

/// The UnQLite library version, e.g. `"1.1.6"`.
pub fn version() -> &'static str {
    // SAFETY: the engine returns a static string
    unsafe { cstr(ffi::unqlite_lib_version()) }
}

/// The full library signature string.
pub fn signature() -> &'static str {
    // SAFETY: the engine returns a static string
    unsafe { cstr(ffi::unqlite_lib_signature()) }
}

/// The library identification string (version + build id).
pub fn ident() -> &'static str {
    // SAFETY: the engine returns a static string
    unsafe { cstr(ffi::unqlite_lib_ident()) }
}

/// The engine's copyright notice.
pub fn copyright() -> &'static str {
    // SAFETY: the engine returns a static string
    unsafe { cstr(ffi::unqlite_lib_copyright()) }
}

/// Whether the bundled engine was compiled with threading support.
pub fn is_threadsafe() -> bool {
    // SAFETY: always safe to call
    unsafe { ffi::unqlite_lib_is_threadsafe() != 0 }
}

unsafe fn cstr(ptr: *const std::ffi::c_char) -> &'static str {
    // SAFETY: caller passes a static NUL-terminated string from the engine
    unsafe { CStr::from_ptr(ptr).to_str().unwrap_or("unknown") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_metadata() {
        assert!(version().starts_with('1'), "expected UnQLite 1.x, got {}", version());
        assert!(!signature().is_empty());
        assert!(!ident().is_empty());
        assert!(!copyright().is_empty());
        // Either answer is fine; the call itself must not crash.
        let _ = is_threadsafe();
    }
}

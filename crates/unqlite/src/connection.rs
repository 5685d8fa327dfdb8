//! Database connection, key/value store and transactions.
//!
//! This module provides the safe wrapper around an `unqlite` database
//! handle. All access to the raw handle goes through an internal mutex, so
//! a [`Connection`] can be shared across threads regardless of whether the
//! bundled engine was compiled with its own threading support.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use crate::error::{Error, Result};
use crate::ffi;
use crate::{Collection, Vm};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::{CString, c_int, c_uint};
use std::ptr;
use std::sync::Mutex;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A private, in-memory database that vanishes when the connection is
    /// closed.
    InMemory,
    /// A private, temporary on-disk database, deleted automatically when
    /// the connection is closed.
    Temporary,
    /// A database file at the given path.
    File(String),
}

impl Location {
    fn filename(&self) -> Option<&str> {
        match self {
            Location::InMemory => Some(":mem:"),
            Location::Temporary => None,
            Location::File(path) => Some(path),
        }
    }

    fn location_flags(&self) -> c_uint {
        match self {
            Location::InMemory => ffi::UNQLITE_OPEN_IN_MEMORY,
            Location::Temporary => ffi::UNQLITE_OPEN_TEMP_DB,
            Location::File(_) => 0,
        }
    }
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing (database must exist).
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Fail if the database already exists.
    pub exclusive: bool,
    /// Obtain a read-only memory view of the whole database. Significant
    /// read performance improvement; implies read-only.
    pub mmap: bool,
    /// Open in multi-thread mode (connection not shared between threads).
    pub no_mutex: bool,
    /// Disable the rollback journal. Faster writes, no durability.
    pub omit_journaling: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for a read-only memory-mapped view.
    pub fn read_only_mmap() -> Self {
        Self {
            read_only: true,
            mmap: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            create: true,
            ..Default::default()
        }
    }

    fn to_unqlite_flags(self) -> c_uint {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::UNQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::UNQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::UNQLITE_OPEN_CREATE;
        }
        if self.exclusive {
            flags |= ffi::UNQLITE_OPEN_EXCLUSIVE;
        }
        if self.mmap {
            flags |= ffi::UNQLITE_OPEN_MMAP;
        }
        if self.no_mutex {
            flags |= ffi::UNQLITE_OPEN_NOMUTEX;
        }
        if self.omit_journaling {
            flags |= ffi::UNQLITE_OPEN_OMIT_JOURNALING;
        }

        // Default to create-if-missing if no access mode was given
        if flags & (ffi::UNQLITE_OPEN_READONLY | ffi::UNQLITE_OPEN_READWRITE | ffi::UNQLITE_OPEN_CREATE)
            == 0
        {
            flags |= ffi::UNQLITE_OPEN_CREATE;
        }

        flags
    }
}

/// Configuration for opening connections.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the database lives.
    pub location: Location,
    /// Open flags.
    pub flags: OpenFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: Location::InMemory,
            flags: OpenFlags::create_read_write(),
        }
    }
}

impl Config {
    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Config for a temporary on-disk database.
    pub fn temporary() -> Self {
        Self {
            location: Location::Temporary,
            ..Self::default()
        }
    }

    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            location: Location::File(path.into()),
            ..Self::default()
        }
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Inner state of the connection, protected by a mutex for thread safety.
struct Inner {
    db: *mut ffi::unqlite,
}

// SAFETY: the raw handle is only ever touched while the Mutex around Inner
// is held, so moving it between threads is sound.
unsafe impl Send for Inner {}

/// A connection to an UnQLite database.
///
/// Thread-safe wrapper around a database handle. Dropping the connection
/// closes the database, committing any outstanding write through the
/// engine's auto-commit.
pub struct Connection {
    inner: Mutex<Inner>,
    location: Location,
}

// SAFETY: all access to the raw handle goes through the Mutex.
unsafe impl Send for Connection {}
unsafe impl Sync for Connection {}

/// Check a status code against a handle that is already locked.
pub(crate) fn check_raw(db: *mut ffi::unqlite, rc: c_int) -> Result<()> {
    if rc == ffi::UNQLITE_OK {
        Ok(())
    } else {
        // SAFETY: caller guarantees db is a valid open handle
        Err(unsafe { Error::from_code(db, rc) })
    }
}

impl Connection {
    /// Open a connection with the given configuration.
    pub fn open(config: &Config) -> Result<Self> {
        let c_path = match config.location.filename() {
            Some(name) => Some(CString::new(name)?),
            None => None,
        };
        let name_ptr = c_path.as_ref().map_or(ptr::null(), |s| s.as_ptr());
        let flags = config.flags.to_unqlite_flags() | config.location.location_flags();

        let mut db: *mut ffi::unqlite = ptr::null_mut();
        // SAFETY: we pass valid pointers and check the return value
        let rc = unsafe { ffi::unqlite_open(&mut db, name_ptr, flags) };
        if rc != ffi::UNQLITE_OK {
            let err = if db.is_null() {
                Error::Engine {
                    code: rc,
                    message: None,
                }
            } else {
                // SAFETY: the handle was allocated, so the error log is
                // readable before we close it again
                unsafe {
                    let err = Error::from_code(db, rc);
                    ffi::unqlite_close(db);
                    err
                }
            };
            return Err(err);
        }

        tracing::debug!(location = ?config.location, "opened unqlite database");

        Ok(Self {
            inner: Mutex::new(Inner { db }),
            location: config.location.clone(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&Config::memory())
    }

    /// Open a temporary on-disk database.
    pub fn open_temporary() -> Result<Self> {
        Self::open(&Config::temporary())
    }

    /// Open a file-based database, creating it if needed.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&Config::file(path))
    }

    /// Where this database lives.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Run a closure against the raw handle while holding the lock.
    pub(crate) fn with_db<R>(&self, f: impl FnOnce(*mut ffi::unqlite) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(inner.db)
    }

    // ==================== Key/value store ====================

    /// Store a record, replacing any existing value for the key.
    pub fn kv_set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let (key, value) = (key.as_ref(), value.as_ref());
        self.with_db(|db| {
            // SAFETY: db is valid, key/value slices outlive the call
            let rc = unsafe {
                ffi::unqlite_kv_store(
                    db,
                    key.as_ptr().cast(),
                    key.len() as c_int,
                    value.as_ptr().cast(),
                    value.len() as ffi::unqlite_int64,
                )
            };
            check_raw(db, rc)
        })
    }

    /// Append to the value stored under the key, creating the record if it
    /// does not exist.
    pub fn kv_append(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let (key, value) = (key.as_ref(), value.as_ref());
        self.with_db(|db| {
            // SAFETY: db is valid, key/value slices outlive the call
            let rc = unsafe {
                ffi::unqlite_kv_append(
                    db,
                    key.as_ptr().cast(),
                    key.len() as c_int,
                    value.as_ptr().cast(),
                    value.len() as ffi::unqlite_int64,
                )
            };
            check_raw(db, rc)
        })
    }

    /// Fetch the value stored under the key.
    pub fn kv_fetch(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        let key = key.as_ref();
        self.with_db(|db| {
            // First call sizes the record, second call fills the buffer.
            // The mutex keeps writers out between the two.
            let mut size: ffi::unqlite_int64 = 0;
            // SAFETY: db is valid, null buffer requests the size only
            let rc = unsafe {
                ffi::unqlite_kv_fetch(
                    db,
                    key.as_ptr().cast(),
                    key.len() as c_int,
                    ptr::null_mut(),
                    &mut size,
                )
            };
            check_raw(db, rc)?;

            let mut buf = vec![0u8; size as usize];
            let mut len = size;
            // SAFETY: buf holds `size` writable bytes
            let rc = unsafe {
                ffi::unqlite_kv_fetch(
                    db,
                    key.as_ptr().cast(),
                    key.len() as c_int,
                    buf.as_mut_ptr().cast(),
                    &mut len,
                )
            };
            check_raw(db, rc)?;
            buf.truncate(len as usize);
            Ok(buf)
        })
    }

    /// Remove the record stored under the key.
    pub fn kv_delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        self.with_db(|db| {
            // SAFETY: db is valid, key slice outlives the call
            let rc =
                unsafe { ffi::unqlite_kv_delete(db, key.as_ptr().cast(), key.len() as c_int) };
            check_raw(db, rc)
        })
    }

    /// Check whether a record exists without fetching its contents.
    pub fn kv_contains(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        self.with_db(|db| {
            let mut size: ffi::unqlite_int64 = 0;
            // SAFETY: db is valid, null buffer requests the size only
            let rc = unsafe {
                ffi::unqlite_kv_fetch(
                    db,
                    key.as_ptr().cast(),
                    key.len() as c_int,
                    ptr::null_mut(),
                    &mut size,
                )
            };
            match check_raw(db, rc) {
                Ok(()) => Ok(true),
                Err(Error::NotFound) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    // ==================== Typed helpers ====================

    /// Store a UTF-8 string.
    pub fn put_str(&self, key: impl AsRef<[u8]>, value: &str) -> Result<()> {
        self.kv_set(key, value.as_bytes())
    }

    /// Fetch a UTF-8 string.
    pub fn get_str(&self, key: impl AsRef<[u8]>) -> Result<String> {
        let bytes = self.kv_fetch(key)?;
        String::from_utf8(bytes).map_err(|_| Error::Type {
            expected: "utf-8 string",
        })
    }

    /// Store an integer as 8 little-endian bytes.
    pub fn put_i64(&self, key: impl AsRef<[u8]>, value: i64) -> Result<()> {
        self.kv_set(key, value.to_le_bytes())
    }

    /// Fetch an integer stored with [`put_i64`](Self::put_i64).
    pub fn get_i64(&self, key: impl AsRef<[u8]>) -> Result<i64> {
        let bytes = self.kv_fetch(key)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Type { expected: "i64" })?;
        Ok(i64::from_le_bytes(arr))
    }

    /// Store a double as 8 little-endian bytes.
    pub fn put_f64(&self, key: impl AsRef<[u8]>, value: f64) -> Result<()> {
        self.kv_set(key, value.to_le_bytes())
    }

    /// Fetch a double stored with [`put_f64`](Self::put_f64).
    pub fn get_f64(&self, key: impl AsRef<[u8]>) -> Result<f64> {
        let bytes = self.kv_fetch(key)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Type { expected: "f64" })?;
        Ok(f64::from_le_bytes(arr))
    }

    /// Serialize a value to JSON and store it.
    pub fn put_json<T: Serialize>(&self, key: impl AsRef<[u8]>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv_set(key, bytes)
    }

    /// Fetch and deserialize a JSON value stored with
    /// [`put_json`](Self::put_json).
    pub fn get_json<T: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<T> {
        let bytes = self.kv_fetch(key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ==================== Transactions ====================

    /// Begin a write transaction.
    pub fn begin(&self) -> Result<()> {
        tracing::trace!("begin transaction");
        self.with_db(|db| {
            // SAFETY: db is valid
            check_raw(db, unsafe { ffi::unqlite_begin(db) })
        })
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> Result<()> {
        tracing::trace!("commit transaction");
        self.with_db(|db| {
            // SAFETY: db is valid
            check_raw(db, unsafe { ffi::unqlite_commit(db) })
        })
    }

    /// Roll back the current transaction.
    pub fn rollback(&self) -> Result<()> {
        tracing::trace!("rollback transaction");
        self.with_db(|db| {
            // SAFETY: db is valid
            check_raw(db, unsafe { ffi::unqlite_rollback(db) })
        })
    }

    /// Run a closure inside a transaction: commit on `Ok`, roll back on
    /// `Err`. The closure's error is returned even if the rollback itself
    /// fails.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.rollback() {
                    tracing::warn!(error = %rb, "rollback failed after transaction error");
                }
                Err(e)
            }
        }
    }

    // ==================== Jx9 ====================

    /// Compile a Jx9 script into a virtual machine.
    pub fn vm(&self, script: &str) -> Result<Vm<'_>> {
        Vm::compile(self, script)
    }

    /// Open the named document-store collection, creating it if missing.
    pub fn collection(&self, name: &str) -> Result<Collection<'_>> {
        Collection::open(self, name)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if !inner.db.is_null() {
                // SAFETY: db is valid and not used after this point
                unsafe {
                    ffi::unqlite_close(inner.db);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flag_mapping() {
        assert_eq!(
            OpenFlags::read_only().to_unqlite_flags(),
            ffi::UNQLITE_OPEN_READONLY
        );
        assert_eq!(
            OpenFlags::read_only_mmap().to_unqlite_flags(),
            ffi::UNQLITE_OPEN_READONLY | ffi::UNQLITE_OPEN_MMAP
        );
        assert_eq!(
            OpenFlags::create_read_write().to_unqlite_flags(),
            ffi::UNQLITE_OPEN_CREATE
        );
        // No access mode requested: fall back to create-if-missing
        assert_eq!(
            OpenFlags::default().to_unqlite_flags(),
            ffi::UNQLITE_OPEN_CREATE
        );
        let flags = OpenFlags {
            create: true,
            omit_journaling: true,
            ..Default::default()
        };
        assert_eq!(
            flags.to_unqlite_flags(),
            ffi::UNQLITE_OPEN_CREATE | ffi::UNQLITE_OPEN_OMIT_JOURNALING
        );
    }

    #[test]
    fn location_filenames() {
        assert_eq!(Location::InMemory.filename(), Some(":mem:"));
        assert_eq!(Location::Temporary.filename(), None);
        assert_eq!(
            Location::File("db.unqlite".into()).filename(),
            Some("db.unqlite")
        );
    }

    #[test]
    fn open_memory() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.location(), &Location::InMemory);
    }

    #[test]
    fn kv_round_trip() {
        let conn = Connection::open_memory().unwrap();
        conn.kv_set("greeting", b"hello").unwrap();
        assert_eq!(conn.kv_fetch("greeting").unwrap(), b"hello");
        assert!(conn.kv_contains("greeting").unwrap());

        conn.kv_delete("greeting").unwrap();
        assert!(!conn.kv_contains("greeting").unwrap());
        assert!(conn.kv_fetch("greeting").unwrap_err().is_not_found());
    }

    #[test]
    fn fetch_missing_key_is_not_found() {
        let conn = Connection::open_memory().unwrap();
        match conn.kv_fetch("missing") {
            Err(Error::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}

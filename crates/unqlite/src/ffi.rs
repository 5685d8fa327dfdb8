//! Low-level FFI bindings to the UnQLite engine.
//!
//! These bindings are manually written to provide full control over the
//! interface. We only declare what the binding actually uses; the engine
//! itself is compiled and linked by the `unqlite-sys` build script.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

// Pulled in for its build script only: it compiles the vendored amalgamation
// and emits the static-link directive that resolves the symbols below.
use unqlite_sys as _;

use std::ffi::{c_char, c_int, c_uint, c_void};

/// 64-bit integer type used by the engine for data lengths.
pub type unqlite_int64 = i64;

/// Opaque database handle.
#[repr(C)]
pub struct unqlite {
    _private: [u8; 0],
}

/// Opaque handle to a compiled Jx9 program.
#[repr(C)]
pub struct unqlite_vm {
    _private: [u8; 0],
}

/// Opaque dynamically-typed Jx9 value.
#[repr(C)]
pub struct unqlite_value {
    _private: [u8; 0],
}

/// Opaque call context passed to foreign functions.
#[repr(C)]
pub struct unqlite_context {
    _private: [u8; 0],
}

// Status codes. UnQLite reuses the Symisc SXERR_* numbering, which is why
// every failure code is negative.
pub const UNQLITE_OK: c_int = 0;
pub const UNQLITE_NOMEM: c_int = -1;
pub const UNQLITE_IOERR: c_int = -2;
pub const UNQLITE_EMPTY: c_int = -3;
pub const UNQLITE_LOCKED: c_int = -4;
pub const UNQLITE_NOTFOUND: c_int = -6;
pub const UNQLITE_LIMIT: c_int = -7;
pub const UNQLITE_INVALID: c_int = -9;
pub const UNQLITE_ABORT: c_int = -10;
pub const UNQLITE_EXISTS: c_int = -11;
pub const UNQLITE_UNKNOWN: c_int = -13;
pub const UNQLITE_BUSY: c_int = -14;
pub const UNQLITE_NOTIMPLEMENTED: c_int = -17;
pub const UNQLITE_EOF: c_int = -18;
pub const UNQLITE_PERM: c_int = -19;
pub const UNQLITE_NOOP: c_int = -20;
pub const UNQLITE_CORRUPT: c_int = -24;
pub const UNQLITE_DONE: c_int = -28;
pub const UNQLITE_COMPILE_ERR: c_int = -70;
pub const UNQLITE_VM_ERR: c_int = -71;
pub const UNQLITE_FULL: c_int = -73;
pub const UNQLITE_CANTOPEN: c_int = -74;
pub const UNQLITE_READ_ONLY: c_int = -75;
pub const UNQLITE_LOCKERR: c_int = -76;

// unqlite_open() flags
pub const UNQLITE_OPEN_READONLY: c_uint = 0x0000_0001;
pub const UNQLITE_OPEN_READWRITE: c_uint = 0x0000_0002;
pub const UNQLITE_OPEN_CREATE: c_uint = 0x0000_0004;
pub const UNQLITE_OPEN_EXCLUSIVE: c_uint = 0x0000_0008;
pub const UNQLITE_OPEN_TEMP_DB: c_uint = 0x0000_0010;
pub const UNQLITE_OPEN_NOMUTEX: c_uint = 0x0000_0020;
pub const UNQLITE_OPEN_OMIT_JOURNALING: c_uint = 0x0000_0040;
pub const UNQLITE_OPEN_IN_MEMORY: c_uint = 0x0000_0080;
pub const UNQLITE_OPEN_MMAP: c_uint = 0x0000_0100;

// unqlite_config() verbs
pub const UNQLITE_CONFIG_JX9_ERR_LOG: c_int = 1;
pub const UNQLITE_CONFIG_MAX_PAGE_CACHE: c_int = 2;
pub const UNQLITE_CONFIG_ERR_LOG: c_int = 3;
pub const UNQLITE_CONFIG_DISABLE_AUTO_COMMIT: c_int = 5;

// unqlite_vm_config() verbs
pub const UNQLITE_VM_CONFIG_OUTPUT: c_int = 1;
pub const UNQLITE_VM_CONFIG_ERR_REPORT: c_int = 3;
pub const UNQLITE_VM_CONFIG_CREATE_VAR: c_int = 6;
pub const UNQLITE_VM_CONFIG_EXTRACT_OUTPUT: c_int = 13;

/// VM output consumer installed via [`vm_config_output`].
pub type unqlite_output_consumer =
    Option<unsafe extern "C" fn(*const c_void, c_uint, *mut c_void) -> c_int>;

/// Callback invoked for each entry by `unqlite_array_walk`.
pub type unqlite_array_walk_fn =
    Option<unsafe extern "C" fn(*mut unqlite_value, *mut unqlite_value, *mut c_void) -> c_int>;

/// Implementation of a Jx9 foreign function.
pub type unqlite_foreign_fn =
    Option<unsafe extern "C" fn(*mut unqlite_context, c_int, *mut *mut unqlite_value) -> c_int>;

unsafe extern "C" {
    // Database engine handle
    pub fn unqlite_open(pp_db: *mut *mut unqlite, filename: *const c_char, mode: c_uint) -> c_int;
    pub fn unqlite_config(db: *mut unqlite, op: c_int, ...) -> c_int;
    pub fn unqlite_close(db: *mut unqlite) -> c_int;

    // Key/value store
    pub fn unqlite_kv_store(
        db: *mut unqlite,
        key: *const c_void,
        key_len: c_int,
        data: *const c_void,
        data_len: unqlite_int64,
    ) -> c_int;
    pub fn unqlite_kv_append(
        db: *mut unqlite,
        key: *const c_void,
        key_len: c_int,
        data: *const c_void,
        data_len: unqlite_int64,
    ) -> c_int;
    pub fn unqlite_kv_fetch(
        db: *mut unqlite,
        key: *const c_void,
        key_len: c_int,
        buf: *mut c_void,
        buf_len: *mut unqlite_int64,
    ) -> c_int;
    pub fn unqlite_kv_delete(db: *mut unqlite, key: *const c_void, key_len: c_int) -> c_int;

    // Manual transaction control
    pub fn unqlite_begin(db: *mut unqlite) -> c_int;
    pub fn unqlite_commit(db: *mut unqlite) -> c_int;
    pub fn unqlite_rollback(db: *mut unqlite) -> c_int;

    // Jx9 virtual machine
    pub fn unqlite_compile(
        db: *mut unqlite,
        jx9: *const c_char,
        len: c_int,
        pp_vm: *mut *mut unqlite_vm,
    ) -> c_int;
    pub fn unqlite_vm_config(vm: *mut unqlite_vm, op: c_int, ...) -> c_int;
    pub fn unqlite_vm_exec(vm: *mut unqlite_vm) -> c_int;
    pub fn unqlite_vm_reset(vm: *mut unqlite_vm) -> c_int;
    pub fn unqlite_vm_release(vm: *mut unqlite_vm) -> c_int;
    pub fn unqlite_vm_extract_variable(
        vm: *mut unqlite_vm,
        varname: *const c_char,
    ) -> *mut unqlite_value;
    pub fn unqlite_vm_new_scalar(vm: *mut unqlite_vm) -> *mut unqlite_value;
    pub fn unqlite_vm_new_array(vm: *mut unqlite_vm) -> *mut unqlite_value;
    pub fn unqlite_vm_release_value(vm: *mut unqlite_vm, value: *mut unqlite_value) -> c_int;

    // Foreign functions
    pub fn unqlite_create_function(
        vm: *mut unqlite_vm,
        name: *const c_char,
        func: unqlite_foreign_fn,
        user_data: *mut c_void,
    ) -> c_int;
    pub fn unqlite_delete_function(vm: *mut unqlite_vm, name: *const c_char) -> c_int;
    pub fn unqlite_context_new_scalar(ctx: *mut unqlite_context) -> *mut unqlite_value;
    pub fn unqlite_context_new_array(ctx: *mut unqlite_context) -> *mut unqlite_value;
    pub fn unqlite_context_release_value(ctx: *mut unqlite_context, value: *mut unqlite_value);
    pub fn unqlite_context_user_data(ctx: *mut unqlite_context) -> *mut c_void;
    pub fn unqlite_result_value(ctx: *mut unqlite_context, value: *mut unqlite_value) -> c_int;

    // Populating unqlite_value handles
    pub fn unqlite_value_int64(value: *mut unqlite_value, v: unqlite_int64) -> c_int;
    pub fn unqlite_value_bool(value: *mut unqlite_value, v: c_int) -> c_int;
    pub fn unqlite_value_null(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_double(value: *mut unqlite_value, v: f64) -> c_int;
    pub fn unqlite_value_string(value: *mut unqlite_value, s: *const c_char, len: c_int) -> c_int;

    // Reading unqlite_value handles
    pub fn unqlite_value_to_int64(value: *mut unqlite_value) -> unqlite_int64;
    pub fn unqlite_value_to_bool(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_to_double(value: *mut unqlite_value) -> f64;
    pub fn unqlite_value_to_string(value: *mut unqlite_value, len: *mut c_int) -> *const c_char;
    pub fn unqlite_value_is_int(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_float(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_bool(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_string(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_null(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_json_array(value: *mut unqlite_value) -> c_int;
    pub fn unqlite_value_is_json_object(value: *mut unqlite_value) -> c_int;

    // Jx9 arrays / objects
    pub fn unqlite_array_walk(
        array: *mut unqlite_value,
        walk: unqlite_array_walk_fn,
        user_data: *mut c_void,
    ) -> c_int;
    pub fn unqlite_array_add_elem(
        array: *mut unqlite_value,
        key: *mut unqlite_value,
        value: *mut unqlite_value,
    ) -> c_int;
    pub fn unqlite_array_add_strkey_elem(
        array: *mut unqlite_value,
        key: *const c_char,
        value: *mut unqlite_value,
    ) -> c_int;

    // Library metadata
    pub fn unqlite_lib_version() -> *const c_char;
    pub fn unqlite_lib_signature() -> *const c_char;
    pub fn unqlite_lib_ident() -> *const c_char;
    pub fn unqlite_lib_copyright() -> *const c_char;
    pub fn unqlite_lib_is_threadsafe() -> c_int;
}

/// Reported length of an error-log buffer with a single trailing newline
/// removed. The buffer itself is never touched; only the length shrinks,
/// and only by one, so the result is never negative and never exceeds the
/// input length.
pub(crate) fn trimmed_len(buf: &[u8]) -> usize {
    match buf.last() {
        Some(b'\n') => buf.len() - 1,
        _ => buf.len(),
    }
}

/// Query one of the engine's error logs through the generic configuration
/// dispatcher.
///
/// `verb` selects the log ([`UNQLITE_CONFIG_ERR_LOG`] or
/// [`UNQLITE_CONFIG_JX9_ERR_LOG`]). On return `*buf` points at engine-owned
/// storage and `*len` holds its length, with a trailing newline trimmed from
/// the reported length. The engine's status code is returned verbatim and
/// must be checked before trusting the buffer.
///
/// # Safety
/// `db` must be a valid open database handle; `buf` and `len` must be valid
/// for writes.
pub unsafe fn config_err_log(
    db: *mut unqlite,
    verb: c_int,
    buf: *mut *mut c_char,
    len: *mut c_int,
) -> c_int {
    unsafe {
        let rc = unqlite_config(db, verb, buf, len);
        let n = *len;
        if n > 0 {
            let bytes = std::slice::from_raw_parts((*buf).cast::<u8>(), n as usize);
            *len = trimmed_len(bytes) as c_int;
        }
        rc
    }
}

/// Register a foreign variable with a compiled Jx9 program.
///
/// Forwards through the per-VM configuration dispatcher with the
/// `CREATE_VAR` verb. The engine copies the value but keeps a reference to
/// `name`, which therefore must outlive the VM.
///
/// # Safety
/// `vm` must be a valid VM handle, `name` a NUL-terminated string that
/// outlives the VM, and `value` a live `unqlite_value` owned by that VM.
pub unsafe fn vm_config_create_var(
    vm: *mut unqlite_vm,
    name: *const c_char,
    value: *mut unqlite_value,
) -> c_int {
    unsafe { unqlite_vm_config(vm, UNQLITE_VM_CONFIG_CREATE_VAR, name, value) }
}

/// Install a VM output consumer through the per-VM configuration dispatcher
/// with the `OUTPUT` verb. Ownership and lifetime of `user_data` stay with
/// the caller.
///
/// # Safety
/// `vm` must be a valid VM handle and `user_data` must stay valid for as
/// long as the consumer can be invoked.
pub unsafe fn vm_config_output(
    vm: *mut unqlite_vm,
    consumer: unqlite_output_consumer,
    user_data: *mut c_void,
) -> c_int {
    unsafe { unqlite_vm_config(vm, UNQLITE_VM_CONFIG_OUTPUT, consumer, user_data) }
}

//! Jx9 virtual machine.
//!
//! A [`Vm`] owns one compiled Jx9 program. Variables are pushed in through
//! the engine's per-VM configuration dispatcher before execution and pulled
//! back out afterwards; program output can be redirected into a Rust
//! closure instead of being buffered by the engine.

#![allow(clippy::cast_possible_truncation)]

use crate::connection::{Connection, check_raw};
use crate::error::{Error, Result};
use crate::ffi;
use crate::value::{Value, ValueAlloc, decode_value, encode_value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::{CString, c_int, c_uint, c_void};
use std::ptr;

type OutputClosure = Box<dyn FnMut(&str)>;
type FunctionClosure = Box<dyn FnMut(&[Value]) -> Result<Value>>;

/// A compiled Jx9 program bound to its connection.
///
/// Not `Send`: the VM handle belongs to the thread that compiled it.
pub struct Vm<'db> {
    db: &'db Connection,
    vm: *mut ffi::unqlite_vm,
    // CREATE_VAR does not copy the variable name, so every registered name
    // must stay alive until the VM is released.
    names: Vec<CString>,
    output: Option<Box<OutputClosure>>,
    functions: Vec<(CString, Box<FunctionClosure>)>,
}

impl std::fmt::Debug for Vm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm").field("vm", &self.vm).finish_non_exhaustive()
    }
}

impl<'db> Vm<'db> {
    /// Compile a Jx9 script. Compile errors carry the Jx9 compiler log.
    pub(crate) fn compile(db: &'db Connection, script: &str) -> Result<Self> {
        let vm = db.with_db(|raw| {
            let mut vm: *mut ffi::unqlite_vm = ptr::null_mut();
            // SAFETY: raw is a valid handle, script length is passed
            // explicitly so no NUL terminator is required
            let rc = unsafe {
                ffi::unqlite_compile(raw, script.as_ptr().cast(), script.len() as c_int, &mut vm)
            };
            check_raw(raw, rc)?;
            Ok::<_, Error>(vm)
        })?;
        tracing::trace!(script_len = script.len(), "compiled jx9 script");
        Ok(Self {
            db,
            vm,
            names: Vec::new(),
            output: None,
            functions: Vec::new(),
        })
    }

    /// Register a foreign variable visible to the script as `$name`.
    ///
    /// The engine makes a private copy of the value, so the handle is
    /// released right away; the name is retained for the life of the VM.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let c_name = CString::new(name)?;
        let alloc = VmAlloc(self.vm);
        // SAFETY: the allocator wraps this VM's live handle
        let val = unsafe { encode_value(&alloc, &value)? };
        // SAFETY: vm, name and value are all live here
        let rc = unsafe { ffi::vm_config_create_var(self.vm, c_name.as_ptr(), val) };
        // SAFETY: the engine copied the value
        unsafe { ffi::unqlite_vm_release_value(self.vm, val) };
        self.db.with_db(|db| check_raw(db, rc))?;
        self.names.push(c_name);
        Ok(())
    }

    /// Register a foreign variable from any serializable value.
    ///
    /// The value is converted through its JSON representation, the same
    /// encoding [`Connection::put_json`](crate::Connection::put_json) uses.
    pub fn set_variable_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.set_variable(name, Value::from_json(json))
    }

    /// Extract the value of a variable after execution.
    pub fn variable(&self, name: &str) -> Result<Value> {
        let c_name = CString::new(name)?;
        // SAFETY: vm is live, name is NUL-terminated
        let ptr = unsafe { ffi::unqlite_vm_extract_variable(self.vm, c_name.as_ptr()) };
        if ptr.is_null() {
            return Err(Error::NotFound);
        }
        // SAFETY: ptr is a live value owned by this VM
        let out = unsafe { decode_value(ptr) };
        // SAFETY: extracted values must be handed back to the VM
        unsafe { ffi::unqlite_vm_release_value(self.vm, ptr) };
        out
    }

    /// Extract a variable and deserialize it into a typed value.
    pub fn variable_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.variable(name)?;
        Ok(serde_json::from_value(value.into_json())?)
    }

    /// Redirect VM output into a closure.
    ///
    /// The engine streams generated output (e.g. from `print`) through the
    /// callback in chunks. A chunk that is not valid UTF-8 aborts the VM.
    /// The closure must not call back into this VM's connection.
    pub fn set_output(&mut self, callback: impl FnMut(&str) + 'static) -> Result<()> {
        let mut boxed: Box<OutputClosure> = Box::new(Box::new(callback));
        let user_data = (&raw mut *boxed).cast::<c_void>();
        // SAFETY: the closure box outlives the VM; replacing it below only
        // happens after the engine has been pointed at the new one
        let rc = unsafe { ffi::vm_config_output(self.vm, Some(output_trampoline), user_data) };
        self.db.with_db(|db| check_raw(db, rc))?;
        self.output = Some(boxed);
        Ok(())
    }

    /// Install a Jx9 foreign function implemented by a Rust closure.
    ///
    /// An error returned by the closure aborts the running script with
    /// `UNQLITE_ABORT`.
    pub fn register_function(
        &mut self,
        name: &str,
        f: impl FnMut(&[Value]) -> Result<Value> + 'static,
    ) -> Result<()> {
        let c_name = CString::new(name)?;
        let mut boxed: Box<FunctionClosure> = Box::new(Box::new(f));
        let user_data = (&raw mut *boxed).cast::<c_void>();
        // SAFETY: vm and name are live; the closure box is retained below
        let rc = unsafe {
            ffi::unqlite_create_function(self.vm, c_name.as_ptr(), Some(function_trampoline), user_data)
        };
        self.db.with_db(|db| check_raw(db, rc))?;
        self.functions.push((c_name, boxed));
        Ok(())
    }

    /// Remove a foreign function installed with
    /// [`register_function`](Self::register_function).
    pub fn delete_function(&mut self, name: &str) -> Result<()> {
        let c_name = CString::new(name)?;
        // SAFETY: vm and name are live
        let rc = unsafe { ffi::unqlite_delete_function(self.vm, c_name.as_ptr()) };
        self.db.with_db(|db| check_raw(db, rc))?;
        self.functions.retain(|(n, _)| n.as_c_str() != c_name.as_c_str());
        Ok(())
    }

    /// Execute the program.
    pub fn exec(&mut self) -> Result<()> {
        // SAFETY: vm is live; the db lock serializes against other users
        // of the same connection
        self.db
            .with_db(|db| check_raw(db, unsafe { ffi::unqlite_vm_exec(self.vm) }))
    }

    /// Reset the VM so the program can run again.
    pub fn reset(&mut self) -> Result<()> {
        // SAFETY: vm is live
        self.db
            .with_db(|db| check_raw(db, unsafe { ffi::unqlite_vm_reset(self.vm) }))
    }
}

impl Drop for Vm<'_> {
    fn drop(&mut self) {
        // SAFETY: vm is released exactly once; retained names, closures and
        // function boxes drop afterwards, when the engine no longer
        // references them
        unsafe {
            ffi::unqlite_vm_release(self.vm);
        }
    }
}

/// Value allocator backed by a VM handle.
struct VmAlloc(*mut ffi::unqlite_vm);

impl ValueAlloc for VmAlloc {
    unsafe fn alloc_scalar(&self) -> *mut ffi::unqlite_value {
        unsafe { ffi::unqlite_vm_new_scalar(self.0) }
    }

    unsafe fn alloc_array(&self) -> *mut ffi::unqlite_value {
        unsafe { ffi::unqlite_vm_new_array(self.0) }
    }

    unsafe fn release(&self, value: *mut ffi::unqlite_value) {
        unsafe {
            ffi::unqlite_vm_release_value(self.0, value);
        }
    }
}

/// Value allocator backed by a foreign-function call context.
struct CtxAlloc(*mut ffi::unqlite_context);

impl ValueAlloc for CtxAlloc {
    unsafe fn alloc_scalar(&self) -> *mut ffi::unqlite_value {
        unsafe { ffi::unqlite_context_new_scalar(self.0) }
    }

    unsafe fn alloc_array(&self) -> *mut ffi::unqlite_value {
        unsafe { ffi::unqlite_context_new_array(self.0) }
    }

    unsafe fn release(&self, value: *mut ffi::unqlite_value) {
        unsafe {
            ffi::unqlite_context_release_value(self.0, value);
        }
    }
}

unsafe extern "C" fn output_trampoline(
    output: *const c_void,
    len: c_uint,
    user_data: *mut c_void,
) -> c_int {
    unsafe {
        if user_data.is_null() || (output.is_null() && len > 0) {
            return ffi::UNQLITE_ABORT;
        }
        let bytes = if len == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(output.cast::<u8>(), len as usize)
        };
        let Ok(chunk) = std::str::from_utf8(bytes) else {
            return ffi::UNQLITE_ABORT;
        };
        let callback = &mut *user_data.cast::<OutputClosure>();
        callback(chunk);
        ffi::UNQLITE_OK
    }
}

unsafe extern "C" fn function_trampoline(
    ctx: *mut ffi::unqlite_context,
    argc: c_int,
    argv: *mut *mut ffi::unqlite_value,
) -> c_int {
    unsafe {
        let user_data = ffi::unqlite_context_user_data(ctx);
        if user_data.is_null() {
            return ffi::UNQLITE_ABORT;
        }
        let f = &mut *user_data.cast::<FunctionClosure>();

        let mut args = Vec::with_capacity(argc as usize);
        for i in 0..argc {
            // The engine builds argv with its internal SySet allocator, which
            // only guarantees 4-byte alignment, so the pointers must be read
            // unaligned.
            let arg = argv.add(i as usize).read_unaligned();
            if arg.is_null() {
                return ffi::UNQLITE_ABORT;
            }
            match decode_value(arg) {
                Ok(v) => args.push(v),
                Err(_) => return ffi::UNQLITE_ABORT,
            }
        }

        let Ok(result) = f(&args) else {
            return ffi::UNQLITE_ABORT;
        };

        let alloc = CtxAlloc(ctx);
        match encode_value(&alloc, &result) {
            Ok(val) => {
                let rc = ffi::unqlite_result_value(ctx, val);
                alloc.release(val);
                if rc == ffi::UNQLITE_OK {
                    ffi::UNQLITE_OK
                } else {
                    ffi::UNQLITE_ABORT
                }
            }
            Err(_) => ffi::UNQLITE_ABORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::Connection;
    use crate::error::Error;
    use crate::ffi;
    use crate::value::Value;

    #[test]
    fn exec_and_extract_scalar() {
        let conn = Connection::open_memory().unwrap();
        let mut vm = conn.vm("$answer = 6 * 7;").unwrap();
        vm.exec().unwrap();
        assert_eq!(vm.variable("answer").unwrap(), Value::Int(42));
    }

    #[test]
    fn compile_error_reports_engine_code() {
        let conn = Connection::open_memory().unwrap();
        match conn.vm("if ( { ") {
            Err(Error::Engine { code, .. }) => assert_eq!(code, ffi::UNQLITE_COMPILE_ERR),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn missing_variable_is_not_found() {
        let conn = Connection::open_memory().unwrap();
        let mut vm = conn.vm("$x = 1;").unwrap();
        vm.exec().unwrap();
        assert!(vm.variable("no_such_var").unwrap_err().is_not_found());
    }
}

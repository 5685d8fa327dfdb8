//! Dynamic Jx9 values.
//!
//! Jx9 has a small dynamic type system: null, booleans, 64-bit integers,
//! doubles, strings, and arrays — where an array with string keys is a JSON
//! object. `Value` mirrors that system on the Rust side; the engine-owned
//! `unqlite_value` handles are encoded and decoded at the VM boundary.

use crate::error::{Error, Result};
use crate::ffi;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::{CString, c_int, c_void};

/// A dynamically-typed Jx9 value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Jx9 null
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    Text(String),
    /// JSON array
    Array(Vec<Value>),
    /// JSON object; keys are ordered for deterministic rendering
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to read this value as a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to read this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to read this value as an f64. Integers widen losslessly enough
    /// for Jx9 arithmetic results, which come back as either type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Try to read this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to read this value as an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to read this value as an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable object access, mainly for stripping engine-managed fields
    /// such as `__id` before comparing records.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Convert a `serde_json::Value` into a Jx9 value.
    ///
    /// Unsigned integers above `i64::MAX` fall back to doubles, which is
    /// also what Jx9 itself would do with such a literal.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert this value into a `serde_json::Value`.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Double(n) => serde_json::Value::from(n),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        v.into_json()
    }
}

/// Allocator for engine-owned `unqlite_value` handles. Both the VM and a
/// foreign-function call context can allocate them, each with its own
/// release call.
pub(crate) trait ValueAlloc {
    unsafe fn alloc_scalar(&self) -> *mut ffi::unqlite_value;
    unsafe fn alloc_array(&self) -> *mut ffi::unqlite_value;
    unsafe fn release(&self, value: *mut ffi::unqlite_value);
}

/// Encode a [`Value`] into a freshly allocated `unqlite_value`.
///
/// The returned handle is owned by the allocator and must be released by
/// the caller once handed to the engine (the engine copies values).
///
/// # Safety
/// The allocator must wrap a live VM or call context.
pub(crate) unsafe fn encode_value<A: ValueAlloc>(
    alloc: &A,
    value: &Value,
) -> Result<*mut ffi::unqlite_value> {
    unsafe {
        let ptr = match value {
            Value::Array(_) | Value::Object(_) => alloc.alloc_array(),
            _ => alloc.alloc_scalar(),
        };
        if ptr.is_null() {
            return Err(Error::Engine {
                code: ffi::UNQLITE_NOMEM,
                message: None,
            });
        }
        if let Err(e) = fill_value(alloc, ptr, value) {
            alloc.release(ptr);
            return Err(e);
        }
        Ok(ptr)
    }
}

unsafe fn fill_value<A: ValueAlloc>(
    alloc: &A,
    ptr: *mut ffi::unqlite_value,
    value: &Value,
) -> Result<()> {
    unsafe {
        let rc = match value {
            Value::Null => ffi::unqlite_value_null(ptr),
            Value::Bool(b) => ffi::unqlite_value_bool(ptr, c_int::from(*b)),
            Value::Int(n) => ffi::unqlite_value_int64(ptr, *n),
            Value::Double(n) => ffi::unqlite_value_double(ptr, *n),
            Value::Text(s) => {
                ffi::unqlite_value_string(ptr, s.as_ptr().cast(), s.len() as c_int)
            }
            Value::Array(items) => {
                for item in items {
                    let elem = encode_value(alloc, item)?;
                    let rc = ffi::unqlite_array_add_elem(ptr, std::ptr::null_mut(), elem);
                    alloc.release(elem);
                    check_rc(rc)?;
                }
                ffi::UNQLITE_OK
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let c_key = CString::new(key.as_str())?;
                    let elem = encode_value(alloc, item)?;
                    let rc = ffi::unqlite_array_add_strkey_elem(ptr, c_key.as_ptr(), elem);
                    alloc.release(elem);
                    check_rc(rc)?;
                }
                ffi::UNQLITE_OK
            }
        };
        check_rc(rc)
    }
}

fn check_rc(rc: c_int) -> Result<()> {
    if rc == ffi::UNQLITE_OK {
        Ok(())
    } else {
        // No database handle in scope here, so no error log to attach.
        Err(Error::Engine {
            code: rc,
            message: None,
        })
    }
}

/// Decode an engine-owned `unqlite_value` into a [`Value`].
///
/// JSON objects and arrays are traversed through `unqlite_array_walk`; the
/// handle is only observed, never released.
///
/// # Safety
/// `ptr` must be a live, non-null `unqlite_value`.
pub(crate) unsafe fn decode_value(ptr: *mut ffi::unqlite_value) -> Result<Value> {
    unsafe {
        // Objects are reported as json arrays too, so the object check must
        // come first.
        if ffi::unqlite_value_is_json_object(ptr) != 0 {
            let mut state = ObjectWalk {
                map: BTreeMap::new(),
                failed: false,
            };
            let rc = ffi::unqlite_array_walk(
                ptr,
                Some(object_walk_cb),
                (&raw mut state).cast::<c_void>(),
            );
            if rc != ffi::UNQLITE_OK || state.failed {
                return Err(Error::Type { expected: "object" });
            }
            return Ok(Value::Object(state.map));
        }
        if ffi::unqlite_value_is_json_array(ptr) != 0 {
            let mut state = ArrayWalk {
                items: Vec::new(),
                failed: false,
            };
            let rc = ffi::unqlite_array_walk(
                ptr,
                Some(array_walk_cb),
                (&raw mut state).cast::<c_void>(),
            );
            if rc != ffi::UNQLITE_OK || state.failed {
                return Err(Error::Type { expected: "array" });
            }
            return Ok(Value::Array(state.items));
        }
        if ffi::unqlite_value_is_string(ptr) != 0 {
            return Ok(Value::Text(value_string(ptr)));
        }
        if ffi::unqlite_value_is_float(ptr) != 0 {
            return Ok(Value::Double(ffi::unqlite_value_to_double(ptr)));
        }
        if ffi::unqlite_value_is_int(ptr) != 0 {
            return Ok(Value::Int(ffi::unqlite_value_to_int64(ptr)));
        }
        if ffi::unqlite_value_is_bool(ptr) != 0 {
            return Ok(Value::Bool(ffi::unqlite_value_to_bool(ptr) != 0));
        }
        if ffi::unqlite_value_is_null(ptr) != 0 {
            return Ok(Value::Null);
        }
        Err(Error::Type {
            expected: "jx9 value",
        })
    }
}

unsafe fn value_string(ptr: *mut ffi::unqlite_value) -> String {
    unsafe {
        let mut len: c_int = 0;
        let s = ffi::unqlite_value_to_string(ptr, &mut len);
        if s.is_null() || len <= 0 {
            return String::new();
        }
        let bytes = std::slice::from_raw_parts(s.cast::<u8>(), len as usize);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

struct ObjectWalk {
    map: BTreeMap<String, Value>,
    failed: bool,
}

struct ArrayWalk {
    items: Vec<Value>,
    failed: bool,
}

unsafe extern "C" fn object_walk_cb(
    key: *mut ffi::unqlite_value,
    value: *mut ffi::unqlite_value,
    user_data: *mut c_void,
) -> c_int {
    unsafe {
        let state = &mut *user_data.cast::<ObjectWalk>();
        if key.is_null() || value.is_null() {
            state.failed = true;
            return ffi::UNQLITE_ABORT;
        }
        // Jx9 coerces the key to a string for us.
        let name = value_string(key);
        match decode_value(value) {
            Ok(v) => {
                state.map.insert(name, v);
                ffi::UNQLITE_OK
            }
            Err(_) => {
                state.failed = true;
                ffi::UNQLITE_ABORT
            }
        }
    }
}

unsafe extern "C" fn array_walk_cb(
    _key: *mut ffi::unqlite_value,
    value: *mut ffi::unqlite_value,
    user_data: *mut c_void,
) -> c_int {
    unsafe {
        let state = &mut *user_data.cast::<ArrayWalk>();
        if value.is_null() {
            state.failed = true;
            return ffi::UNQLITE_ABORT;
        }
        match decode_value(value) {
            Ok(v) => {
                state.items.push(v);
                ffi::UNQLITE_OK
            }
            Err(_) => {
                state.failed = true;
                ffi::UNQLITE_ABORT
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let json = json!({
            "name": "Huey",
            "age": 3,
            "score": 1.5,
            "tags": ["duck", "nephew"],
            "active": true,
            "extra": null,
        });
        let value = Value::from_json(json.clone());
        assert_eq!(value.into_json(), json);
    }

    #[test]
    fn big_unsigned_falls_back_to_double() {
        let json = json!(u64::MAX);
        match Value::from_json(json) {
            Value::Double(d) => assert!(d > 1.8e19),
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn typed_accessors() {
        assert_eq!(Value::from(42i64).as_i64(), Some(42));
        assert_eq!(Value::from(42i32).as_f64(), Some(42.0));
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("hi").as_i64(), None);
    }

    #[test]
    fn object_mutation_strips_keys() {
        let mut record = Value::from_json(json!({"__id": 0, "name": "Huey"}));
        record.as_object_mut().unwrap().remove("__id");
        assert_eq!(record, Value::from_json(json!({"name": "Huey"})));
    }
}

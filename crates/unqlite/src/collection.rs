//! Document-store collections.
//!
//! UnQLite's document store is driven entirely through Jx9: every operation
//! here compiles a small script, binds the collection name (and any other
//! inputs) as foreign variables, executes it, and reads the `$result`
//! variable back out. The collection name is always passed as a variable,
//! never spliced into the script text.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::value::Value;

/// A named collection of JSON records.
///
/// Records are [`Value::Object`]s. The engine assigns each stored record an
/// id, starting at zero, and reports it in the `__id` field of fetched
/// records.
pub struct Collection<'db> {
    db: &'db Connection,
    name: String,
}

impl<'db> Collection<'db> {
    /// Open the collection, creating it if it does not exist.
    pub(crate) fn open(db: &'db Connection, name: &str) -> Result<Self> {
        let col = Self {
            db,
            name: name.to_string(),
        };
        col.create_if_missing()?;
        Ok(col)
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the collection if it does not exist yet.
    pub fn create_if_missing(&self) -> Result<()> {
        self.exec("if (!db_exists($collection)) { db_create($collection); }", vec![])
    }

    /// Drop the collection and every record in it.
    pub fn drop_collection(&self) -> Result<()> {
        self.exec(
            "if (db_exists($collection)) { db_drop_collection($collection); }",
            vec![],
        )
    }

    /// Store one record and return the id the engine assigned to it.
    pub fn append(&self, record: &Value) -> Result<i64> {
        let result = self.eval(
            "if (db_store($collection, $record)) { $result = db_last_record_id($collection); }",
            vec![("record", record.clone())],
        )?;
        result.as_i64().ok_or(Error::Type { expected: "i64" })
    }

    /// Store a batch of records in one script execution.
    pub fn append_all(&self, records: &[Value]) -> Result<()> {
        let result = self.eval(
            "$result = db_store($collection, $records);",
            vec![("records", Value::Array(records.to_vec()))],
        )?;
        if truthy(&result)? {
            Ok(())
        } else {
            Err(Error::Engine {
                code: crate::ffi::UNQLITE_ABORT,
                message: Some("db_store rejected the record batch".into()),
            })
        }
    }

    /// Replace the record with the given id. Returns false when no such
    /// record exists.
    pub fn update(&self, record_id: i64, record: &Value) -> Result<bool> {
        let result = self.eval(
            "$result = db_update_record($collection, $record_id, $record);",
            vec![("record_id", Value::Int(record_id)), ("record", record.clone())],
        )?;
        truthy(&result)
    }

    /// Delete the record with the given id. Returns false when no such
    /// record exists.
    pub fn delete(&self, record_id: i64) -> Result<bool> {
        let result = self.eval(
            "$result = db_drop_record($collection, $record_id);",
            vec![("record_id", Value::Int(record_id))],
        )?;
        truthy(&result)
    }

    /// Id of the most recently stored record.
    pub fn last_record_id(&self) -> Result<i64> {
        let result = self.eval("$result = db_last_record_id($collection);", vec![])?;
        result.as_i64().ok_or(Error::Type { expected: "i64" })
    }

    /// Number of records in the collection.
    pub fn len(&self) -> Result<usize> {
        let result = self.eval("$result = db_total_records($collection);", vec![])?;
        result
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Error::Type { expected: "usize" })
    }

    /// True when the collection holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fetch the record with the given id.
    pub fn fetch(&self, record_id: i64) -> Result<Value> {
        let result = self.eval(
            "$result = db_fetch_by_id($collection, $record_id);",
            vec![("record_id", Value::Int(record_id))],
        )?;
        if result.is_null() {
            return Err(Error::NotFound);
        }
        Ok(result)
    }

    /// Fetch every record.
    pub fn fetch_all(&self) -> Result<Vec<Value>> {
        let result = self.eval("$result = db_fetch_all($collection);", vec![])?;
        into_records(result)
    }

    /// Fetch the records matching a filter expression.
    pub fn fetch_where(&self, filter: &Expr) -> Result<Vec<Value>> {
        let script = format!(
            "$result = db_fetch_all($collection, function($rec) {{ return {}; }});",
            filter.raw()
        );
        let result = self.eval(&script, vec![])?;
        into_records(result)
    }

    /// Fetch the records for which a Rust predicate returns true.
    ///
    /// The predicate runs inside the engine as a Jx9 foreign function, one
    /// call per record.
    pub fn filter(&self, mut pred: impl FnMut(&Value) -> bool + 'static) -> Result<Vec<Value>> {
        let mut vm = self.db.vm("$result = db_fetch_all($collection, _filter_fn);")?;
        vm.register_function("_filter_fn", move |args| {
            let record = args.first().ok_or(Error::Type { expected: "record" })?;
            Ok(Value::Bool(pred(record)))
        })?;
        vm.set_variable("collection", self.name.as_str())?;
        vm.exec()?;
        let result = vm.variable("result")?;
        vm.delete_function("_filter_fn")?;
        into_records(result)
    }

    /// Run a script that produces no `$result`.
    fn exec(&self, script: &str, vars: Vec<(&str, Value)>) -> Result<()> {
        self.run(script, vars)?;
        Ok(())
    }

    /// Run a script and extract its `$result` variable.
    fn eval(&self, script: &str, vars: Vec<(&str, Value)>) -> Result<Value> {
        let vm = self.run(script, vars)?;
        vm.variable("result")
    }

    fn run(&self, script: &str, vars: Vec<(&str, Value)>) -> Result<crate::Vm<'db>> {
        tracing::trace!(collection = %self.name, script, "running collection script");
        let mut vm = self.db.vm(script)?;
        vm.set_variable("collection", self.name.as_str())?;
        for (name, value) in vars {
            vm.set_variable(name, value)?;
        }
        vm.exec()?;
        Ok(vm)
    }
}

/// Jx9 reports success as TRUE but some builtins hand back 0/1.
fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int(n) => Ok(*n != 0),
        _ => Err(Error::Type { expected: "bool" }),
    }
}

fn into_records(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        // An empty result set decodes as null
        Value::Null => Ok(Vec::new()),
        _ => Err(Error::Type { expected: "array" }),
    }
}

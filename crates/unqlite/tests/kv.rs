//! Key/value store integration tests against a live in-memory engine.

use serde::{Deserialize, Serialize};
use unqlite::{Connection, Error};

#[test]
fn string_round_trip() {
    let db = Connection::open_memory().unwrap();

    let ascii: String = (0x20u32..=0x7E).filter_map(char::from_u32).collect();
    let cyrillic: String = (0x400u32..=0x4FF).filter_map(char::from_u32).collect();
    let katakana: String = (0x30A0u32..=0x30FF).filter_map(char::from_u32).collect();
    let emoji: String = (0x1F600u32..=0x1F64F).filter_map(char::from_u32).collect();

    db.put_str("ascii", &ascii).unwrap();
    db.put_str("cyrillic", &cyrillic).unwrap();
    db.put_str("katakana", &katakana).unwrap();
    db.put_str("emoji", &emoji).unwrap();

    assert_eq!(db.get_str("ascii").unwrap(), ascii);
    assert_eq!(db.get_str("cyrillic").unwrap(), cyrillic);
    assert_eq!(db.get_str("katakana").unwrap(), katakana);
    assert_eq!(db.get_str("emoji").unwrap(), emoji);
}

#[test]
fn bytes_round_trip() {
    let db = Connection::open_memory().unwrap();

    let ones = vec![0xFFu8; 1024];
    let ramp: Vec<u8> = (0..=2048u16).map(|i| (i % 251) as u8).collect();

    db.kv_set("ones", &ones).unwrap();
    db.kv_set("ramp", &ramp).unwrap();

    assert_eq!(db.kv_fetch("ones").unwrap(), ones);
    assert_eq!(db.kv_fetch("ramp").unwrap(), ramp);
    assert_ne!(db.kv_fetch("ones").unwrap(), db.kv_fetch("ramp").unwrap());
}

#[test]
fn integer_round_trip() {
    let db = Connection::open_memory().unwrap();

    for (key, value) in [
        ("zero", 0i64),
        ("max", i64::MAX),
        ("min", i64::MIN),
        ("thirteen", 13),
    ] {
        db.put_i64(key, value).unwrap();
        assert_eq!(db.get_i64(key).unwrap(), value);
    }
}

#[test]
fn double_round_trip() {
    let db = Connection::open_memory().unwrap();

    for (key, value) in [
        ("zero", 0.0f64),
        ("max", f64::MAX),
        ("min_positive", f64::MIN_POSITIVE),
        ("thirteen", 13.666),
    ] {
        db.put_f64(key, value).unwrap();
        assert!((db.get_f64(key).unwrap() - value).abs() < f64::EPSILON);
    }
}

#[test]
fn mismatched_width_is_a_type_error() {
    let db = Connection::open_memory().unwrap();
    db.put_str("text", "not a number").unwrap();
    match db.get_i64("text") {
        Err(Error::Type { expected }) => assert_eq!(expected, "i64"),
        other => panic!("expected type error, got {other:?}"),
    }
}

#[test]
fn append_extends_existing_value() {
    let db = Connection::open_memory().unwrap();
    db.kv_set("log", b"first").unwrap();
    db.kv_append("log", b" second").unwrap();
    assert_eq!(db.kv_fetch("log").unwrap(), b"first second");

    // Appending to a missing key creates it
    db.kv_append("fresh", b"start").unwrap();
    assert_eq!(db.kv_fetch("fresh").unwrap(), b"start");
}

#[test]
fn delete_and_contains() {
    let db = Connection::open_memory().unwrap();
    db.put_str("here", "x").unwrap();
    assert!(db.kv_contains("here").unwrap());
    assert!(!db.kv_contains("gone").unwrap());

    db.kv_delete("here").unwrap();
    assert!(!db.kv_contains("here").unwrap());
    assert!(db.kv_delete("here").unwrap_err().is_not_found());
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Account {
    name: String,
    balance: i64,
    tags: Vec<String>,
}

#[test]
fn json_helpers_round_trip_serde_types() {
    let db = Connection::open_memory().unwrap();
    let account = Account {
        name: "Huey".into(),
        balance: 42,
        tags: vec!["duck".into(), "nephew".into()],
    };

    db.put_json("account", &account).unwrap();
    let loaded: Account = db.get_json("account").unwrap();
    assert_eq!(loaded, account);
}

#[test]
fn scoped_transaction_commits_on_ok() {
    let path = std::env::temp_dir().join("unqlite_tx_commit.db");
    let _ = std::fs::remove_file(&path);

    let db = Connection::open_file(path.to_string_lossy().to_string()).unwrap();
    db.transaction(|db| db.put_str("kept", "yes")).unwrap();
    assert_eq!(db.get_str("kept").unwrap(), "yes");

    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn scoped_transaction_rolls_back_on_err() {
    let path = std::env::temp_dir().join("unqlite_tx_rollback.db");
    let _ = std::fs::remove_file(&path);

    let db = Connection::open_file(path.to_string_lossy().to_string()).unwrap();
    db.put_str("base", "committed").unwrap();

    let result: Result<(), Error> = db.transaction(|db| {
        db.put_str("doomed", "value")?;
        Err(Error::Type { expected: "boom" })
    });
    assert!(result.is_err());

    assert!(!db.kv_contains("doomed").unwrap());
    assert_eq!(db.get_str("base").unwrap(), "committed");

    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn file_database_persists_across_connections() {
    let path = std::env::temp_dir().join("unqlite_persist.db");
    let _ = std::fs::remove_file(&path);
    let path_str = path.to_string_lossy().to_string();

    {
        let db = Connection::open_file(path_str.clone()).unwrap();
        db.put_str("durable", "still here").unwrap();
    }
    {
        let db = Connection::open_file(path_str).unwrap();
        assert_eq!(db.get_str("durable").unwrap(), "still here");
    }

    let _ = std::fs::remove_file(&path);
}

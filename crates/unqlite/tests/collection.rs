//! Document collection integration tests, exercising the Jx9-backed
//! collection operations and the filter expression builder.

use std::collections::BTreeMap;

use unqlite::{Connection, Value, field};

fn product(i: i64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::Int(i));
    map.insert("name".to_string(), Value::Text(format!("Product Name {i}")));
    map.insert("qty".to_string(), Value::Int(i * 2));
    #[allow(clippy::cast_precision_loss)]
    map.insert("price".to_string(), Value::Double(i as f64 * 1.5));
    map.insert("is_four".to_string(), Value::Bool(i % 4 == 0));
    Value::Object(map)
}

fn products() -> Vec<Value> {
    (1..=10).map(product).collect()
}

fn strip_id(value: &Value) -> Value {
    let mut map = value.as_object().cloned().unwrap();
    map.remove("__id");
    Value::Object(map)
}

fn seeded() -> Connection {
    let db = Connection::open_memory().unwrap();
    db.collection("products")
        .unwrap()
        .append_all(&products())
        .unwrap();
    db
}

#[test]
fn append_assigns_sequential_record_ids() {
    let db = Connection::open_memory().unwrap();
    let col = db.collection("products").unwrap();

    assert_eq!(col.append(&product(1)).unwrap(), 0);
    assert_eq!(col.append(&product(2)).unwrap(), 1);
    assert_eq!(col.last_record_id().unwrap(), 1);
    assert_eq!(col.len().unwrap(), 2);
}

#[test]
fn fetch_returns_stored_records_with_ids() {
    let db = seeded();
    let col = db.collection("products").unwrap();
    let expected = products();

    assert_eq!(col.len().unwrap(), 10);
    for (i, want) in expected.iter().enumerate() {
        let got = col.fetch(i as i64).unwrap();
        let id = got.as_object().unwrap().get("__id").cloned();
        assert_eq!(id, Some(Value::Int(i as i64)));
        assert_eq!(strip_id(&got), *want);
    }
}

#[test]
fn fetch_all_preserves_insertion_order() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    let all = col.fetch_all().unwrap();
    assert_eq!(all.len(), 10);
    for (i, got) in all.iter().enumerate() {
        assert_eq!(strip_id(got), product(i as i64 + 1));
    }
}

#[test]
fn delete_removes_a_record() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    assert!(col.delete(0).unwrap());
    assert!(col.delete(1).unwrap());
    assert_eq!(col.len().unwrap(), 8);
    assert!(col.fetch(0).unwrap_err().is_not_found());

    // Already gone
    assert!(!col.delete(0).unwrap());
}

#[test]
fn update_replaces_a_record_in_place() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    let replacement = product(99);
    assert!(col.update(2, &replacement).unwrap());
    assert_eq!(strip_id(&col.fetch(2).unwrap()), replacement);
    assert_eq!(col.len().unwrap(), 10);
}

#[test]
fn drop_collection_discards_everything() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    col.drop_collection().unwrap();
    col.create_if_missing().unwrap();
    assert!(col.is_empty().unwrap());
}

#[test]
fn fetch_where_matches_a_single_field() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    let hits = col.fetch_where(&field("id").eq(4)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(strip_id(&hits[0]), product(4));
}

#[test]
fn fetch_where_supports_compound_expressions() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    // price * qty == 300 only holds for product 10 (15.0 * 20)
    let filter = field("id").eq(1).or(field("price").mul(field("qty")).eq(300));
    let hits = col.fetch_where(&filter).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(strip_id(&hits[0]), product(1));
    assert_eq!(strip_id(&hits[1]), product(10));
}

#[test]
fn fetch_where_matches_substrings_case_insensitively() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    // "name 1" appears in "Product Name 1" and "Product Name 10"
    let hits = col.fetch_where(&field("name").contains_ci("name 1")).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(strip_id(&hits[0]), product(1));
    assert_eq!(strip_id(&hits[1]), product(10));

    let exact = col
        .fetch_where(&field("name").equals_ci("product name 7"))
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(strip_id(&exact[0]), product(7));
}

#[test]
fn closure_filters_see_each_record() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    let hits = col
        .filter(|rec| {
            rec.as_object()
                .and_then(|m| m.get("is_four"))
                .and_then(Value::as_bool)
                == Some(true)
        })
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(strip_id(&hits[0]), product(4));
    assert_eq!(strip_id(&hits[1]), product(8));
}

#[test]
fn fetch_where_with_no_matches_is_empty() {
    let db = seeded();
    let col = db.collection("products").unwrap();

    let hits = col.fetch_where(&field("id").gt(1000)).unwrap();
    assert!(hits.is_empty());
}

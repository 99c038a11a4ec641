mod common;
use common::*;

use bson::{doc, Bson};

#[test]
fn distinct_deduplicates_scalars() {
    let coll = open_collection();
    seed_records(&coll);

    let mut statuses: Vec<String> = coll
        .distinct("status", &doc! {})
        .unwrap()
        .into_iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    statuses.sort();
    assert_eq!(statuses, vec!["active", "rejected", "snoozed"]);
}

#[test]
fn distinct_respects_filter() {
    let coll = open_collection();
    seed_records(&coll);

    let statuses = coll
        .distinct("status", &doc! { "revenue": { "$gt": 60_000.0 } })
        .unwrap();
    let mut statuses: Vec<&str> = statuses.iter().map(|v| v.as_str().unwrap()).collect();
    statuses.sort();
    assert_eq!(statuses, vec!["active", "snoozed"]);
}

#[test]
fn distinct_flattens_arrays() {
    let coll = open_collection();
    coll.insert_one(doc! { "tags": ["a", "b"] }).unwrap();
    coll.insert_one(doc! { "tags": ["b", "c"] }).unwrap();
    coll.insert_one(doc! { "tags": "d" }).unwrap();

    let mut tags: Vec<&str> = Vec::new();
    let values = coll.distinct("tags", &doc! {}).unwrap();
    for v in &values {
        tags.push(v.as_str().unwrap());
    }
    tags.sort();
    assert_eq!(tags, vec!["a", "b", "c", "d"]);
}

#[test]
fn distinct_skips_missing_but_keeps_null() {
    let coll = open_collection();
    coll.insert_one(doc! { "v": 1 }).unwrap();
    coll.insert_one(doc! { "v": Bson::Null }).unwrap();
    coll.insert_one(doc! { "other": true }).unwrap();

    let values = coll.distinct("v", &doc! {}).unwrap();
    assert_eq!(values.len(), 2);
    assert!(values.contains(&Bson::Null));
}

#[test]
fn distinct_unifies_numeric_kinds() {
    let coll = open_collection();
    coll.insert_one(doc! { "v": 2_i32 }).unwrap();
    coll.insert_one(doc! { "v": 2_i64 }).unwrap();
    coll.insert_one(doc! { "v": 2.0 }).unwrap();
    coll.insert_one(doc! { "v": 2.5 }).unwrap();

    let values = coll.distinct("v", &doc! {}).unwrap();
    assert_eq!(values.len(), 2);
}

#[test]
fn distinct_on_dotted_path() {
    let coll = open_collection();
    coll.insert_one(doc! { "items": [{ "sku": "A" }, { "sku": "B" }] })
        .unwrap();
    coll.insert_one(doc! { "items": [{ "sku": "B" }] }).unwrap();

    let mut skus: Vec<&str> = Vec::new();
    let values = coll.distinct("items.sku", &doc! {}).unwrap();
    for v in &values {
        skus.push(v.as_str().unwrap());
    }
    skus.sort();
    assert_eq!(skus, vec!["A", "B"]);
}

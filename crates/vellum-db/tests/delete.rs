mod common;
use common::*;

use bson::doc;

#[test]
fn delete_then_find_returns_nothing() {
    let coll = open_collection();
    let id = coll.insert_one(doc! { "name": "A" }).unwrap().inserted_id;

    let result = coll.delete_one(&doc! { "_id": id }).unwrap();
    assert_eq!(result.deleted_count, 1);
    assert!(coll.find_one(&doc! { "_id": id }).unwrap().is_none());
}

#[test]
fn delete_one_no_match_is_zero_count() {
    let coll = open_collection();
    seed_records(&coll);
    let result = coll.delete_one(&doc! { "name": "Nobody" }).unwrap();
    assert_eq!(result.deleted_count, 0);
    assert_eq!(find_all(&coll, doc! {}).len(), 5);
}

#[test]
fn delete_one_removes_only_first_match() {
    let coll = open_collection();
    seed_records(&coll);
    let result = coll.delete_one(&doc! { "status": "active" }).unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(find_all(&coll, doc! { "status": "active" }).len(), 2);
}

#[test]
fn delete_many_with_filter() {
    let coll = open_collection();
    seed_records(&coll);
    let result = coll.delete_many(&doc! { "status": "active" }).unwrap();
    assert_eq!(result.deleted_count, 3);
    assert!(find_all(&coll, doc! { "status": "active" }).is_empty());
    assert_eq!(find_all(&coll, doc! {}).len(), 2);
}

#[test]
fn delete_many_empty_filter_clears_collection() {
    let coll = open_collection();
    seed_records(&coll);
    let result = coll.delete_many(&doc! {}).unwrap();
    assert_eq!(result.deleted_count, 5);
    assert!(find_all(&coll, doc! {}).is_empty());
    assert_eq!(coll.estimated_document_count().unwrap(), 0);
}

#[test]
fn delete_many_on_empty_collection() {
    let coll = open_collection();
    let result = coll.delete_many(&doc! {}).unwrap();
    assert_eq!(result.deleted_count, 0);
}

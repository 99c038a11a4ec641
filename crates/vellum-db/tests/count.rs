mod common;
use common::*;

use bson::doc;
use vellum_db::CountOptions;

#[test]
fn count_with_filter() {
    let coll = open_collection();
    seed_records(&coll);

    assert_eq!(
        coll.count_documents(&doc! {}, CountOptions::default()).unwrap(),
        5
    );
    assert_eq!(
        coll.count_documents(&doc! { "status": "active" }, CountOptions::default())
            .unwrap(),
        3
    );
    assert_eq!(
        coll.count_documents(&doc! { "status": "gone" }, CountOptions::default())
            .unwrap(),
        0
    );
}

#[test]
fn count_honors_skip_and_limit() {
    let coll = open_collection();
    seed_records(&coll);

    let options = CountOptions {
        skip: Some(1),
        limit: None,
    };
    assert_eq!(coll.count_documents(&doc! {}, options).unwrap(), 4);

    let options = CountOptions {
        skip: Some(1),
        limit: Some(2),
    };
    assert_eq!(coll.count_documents(&doc! {}, options).unwrap(), 2);

    let options = CountOptions {
        skip: Some(10),
        limit: None,
    };
    assert_eq!(coll.count_documents(&doc! {}, options).unwrap(), 0);
}

#[test]
fn estimated_count_ignores_filters() {
    let coll = open_collection();
    assert_eq!(coll.estimated_document_count().unwrap(), 0);
    seed_records(&coll);
    assert_eq!(coll.estimated_document_count().unwrap(), 5);

    coll.delete_one(&doc! { "name": "Globex" }).unwrap();
    assert_eq!(coll.estimated_document_count().unwrap(), 4);
}

#![allow(dead_code)]

use bson::oid::ObjectId;
use bson::{doc, Document};
use vellum_db::{Collection, Database, FindOptions, InsertManyOptions};
use vellum_kv::MemoryKv;

pub const COLLECTION: &str = "accounts";

pub fn open() -> Database<MemoryKv> {
    Database::new(MemoryKv::new())
}

pub fn open_collection() -> Collection<MemoryKv> {
    open().collection(COLLECTION).unwrap()
}

/// Insert 5 seed records and return their ids in insertion order.
pub fn seed_records(coll: &Collection<MemoryKv>) -> Vec<ObjectId> {
    let result = coll
        .insert_many(
            vec![
                doc! { "name": "Acme Corp", "revenue": 50_000.0, "status": "active", "tier": 2 },
                doc! { "name": "Globex", "revenue": 80_000.0, "status": "snoozed", "tier": 1 },
                doc! { "name": "Initech", "revenue": 12_000.0, "status": "rejected", "tier": 3 },
                doc! { "name": "Umbrella", "revenue": 95_000.0, "status": "active", "tier": 1 },
                doc! { "name": "Stark Industries", "revenue": 200_000.0, "status": "active", "tier": 2 },
            ],
            InsertManyOptions::default(),
        )
        .unwrap();
    assert!(result.write_errors.is_empty());
    result.inserted_ids
}

pub fn find_all(coll: &Collection<MemoryKv>, filter: Document) -> Vec<Document> {
    coll.find(&filter, FindOptions::default()).unwrap()
}

pub fn names_of(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d.get_str("name").unwrap()).collect()
}

use bson::oid::ObjectId;

use crate::error::WriteError;

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: ObjectId,
}

#[derive(Debug)]
pub struct InsertManyResult {
    /// Ids of the documents that committed, in input order.
    pub inserted_ids: Vec<ObjectId>,
    pub write_errors: Vec<WriteError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<ObjectId>,
}

#[derive(Debug)]
pub struct UpdateManyResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub write_errors: Vec<WriteError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

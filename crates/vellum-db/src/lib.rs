//! A document-store query engine over an ordered, versioned KV
//! substrate: MongoDB-style collections, filters, updates, and
//! secondary indexes, with every write committed as one atomic
//! compare-and-set batch.

mod catalog;
mod collection;
mod database;
mod error;
mod executor;
mod index;
mod keys;
mod options;
mod plan;
mod record;
mod result;
mod sortable;
mod write;

pub use bson::{self, doc, oid::ObjectId, Bson, Document};
pub use collection::Collection;
pub use database::Database;
pub use error::{DbError, WriteError};
pub use index::{IndexDefinition, IndexField, IndexOptions, IndexSpec, PRIMARY_INDEX_NAME};
pub use options::{CountOptions, FindOptions, InsertManyOptions, UpdateOptions};
pub use result::{
    DeleteResult, InsertManyResult, InsertOneResult, UpdateManyResult, UpdateResult,
};

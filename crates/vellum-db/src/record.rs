//! Encoding of primary records and index-entry values, plus `_id`
//! extraction/normalization.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use vellum_kv::KvError;

use crate::error::DbError;

pub(crate) fn encode_document(doc: &Document) -> Result<Vec<u8>, DbError> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)
        .map_err(|e| DbError::InvalidInput(format!("document encoding failed: {e}")))?;
    Ok(buf)
}

pub(crate) fn decode_document(bytes: &[u8]) -> Result<Document, DbError> {
    Document::from_reader(bytes)
        .map_err(|e| DbError::Kv(KvError::Corrupt(format!("stored document: {e}"))))
}

/// The `{ _id: <hex> }` payload stored under an index entry key.
pub(crate) fn index_entry_value(id: &ObjectId) -> Result<Vec<u8>, DbError> {
    encode_document(&doc! { "_id": id.to_hex() })
}

/// Recover the referenced document id from an index entry payload.
pub(crate) fn index_entry_id(bytes: &[u8]) -> Result<ObjectId, DbError> {
    let doc = decode_document(bytes)?;
    let hex = doc
        .get_str("_id")
        .map_err(|_| DbError::Kv(KvError::Corrupt("index entry missing _id".into())))?;
    ObjectId::parse_str(hex)
        .map_err(|e| DbError::Kv(KvError::Corrupt(format!("index entry id: {e}"))))
}

/// Read the `_id` of a stored or about-to-be-stored document.
pub(crate) fn document_id(doc: &Document) -> Result<ObjectId, DbError> {
    match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => Ok(*oid),
        Some(other) => Err(DbError::InvalidInput(format!(
            "_id must be an object id, got {}",
            vellum_query::value::type_name(other)
        ))),
        None => Err(DbError::InvalidInput("document has no _id".into())),
    }
}

/// Ensure a document carries an `_id`, generating one when absent.
/// Returns the id.
pub(crate) fn normalize_id(doc: &mut Document) -> Result<ObjectId, DbError> {
    match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => Ok(*oid),
        Some(other) => Err(DbError::InvalidInput(format!(
            "_id must be an object id, got {}",
            vellum_query::value::type_name(other)
        ))),
        None => {
            let oid = ObjectId::new();
            // Keep _id as the leading field of the stored form.
            let mut fresh = Document::new();
            fresh.insert("_id", oid);
            for (key, value) in doc.iter() {
                fresh.insert(key.clone(), value.clone());
            }
            *doc = fresh;
            Ok(oid)
        }
    }
}

//! The engine's KV key layout, built on the ordered tuple codec.
//!
//! | Purpose        | Key tuple                                                          |
//! |----------------|--------------------------------------------------------------------|
//! | Document       | `(Str collection, Bytes id)`                                       |
//! | Index metadata | `(Str "__indexes__", Str collection, Str index-name)`              |
//! | Index entry    | `(Str collection, Str "__idx__", Str field, Bytes value, Str id)`  |
//!
//! Document keys use a `Bytes` second element and index entries a `Str`
//! one, so the whole document range of a collection sits contiguously
//! before its index entries under the same collection prefix.

use bson::oid::ObjectId;
use vellum_kv::key::{
    bytes_bound_after, bytes_bound_before, bytes_element_range, encode_tuple, prefix_successor,
};
use vellum_kv::KeyPart;

const INDEX_META_NAMESPACE: &str = "__indexes__";
const INDEX_ENTRY_MARKER: &str = "__idx__";

pub fn document_key(collection: &str, id: &ObjectId) -> Vec<u8> {
    encode_tuple(&[KeyPart::str(collection), KeyPart::bytes(id.bytes().to_vec())])
}

/// `[start, end)` byte range holding every document of the collection.
pub fn document_range(collection: &str) -> (Vec<u8>, Vec<u8>) {
    bytes_element_range(&[KeyPart::str(collection)])
}

pub fn index_meta_key(collection: &str, name: &str) -> Vec<u8> {
    encode_tuple(&[
        KeyPart::str(INDEX_META_NAMESPACE),
        KeyPart::str(collection),
        KeyPart::str(name),
    ])
}

pub fn index_meta_prefix(collection: &str) -> Vec<u8> {
    encode_tuple(&[KeyPart::str(INDEX_META_NAMESPACE), KeyPart::str(collection)])
}

fn index_field_parts(collection: &str, field: &str) -> [KeyPart; 3] {
    [
        KeyPart::str(collection),
        KeyPart::str(INDEX_ENTRY_MARKER),
        KeyPart::str(field),
    ]
}

pub fn index_entry_key(
    collection: &str,
    field: &str,
    value_bytes: &[u8],
    id: &ObjectId,
) -> Vec<u8> {
    encode_tuple(&[
        KeyPart::str(collection),
        KeyPart::str(INDEX_ENTRY_MARKER),
        KeyPart::str(field),
        KeyPart::bytes(value_bytes.to_vec()),
        KeyPart::str(id.to_hex()),
    ])
}

/// Prefix covering every entry for one `(collection, field)`.
pub fn index_field_prefix(collection: &str, field: &str) -> Vec<u8> {
    encode_tuple(&index_field_parts(collection, field))
}

/// Prefix covering every entry for one exact serialized value.
pub fn index_value_prefix(collection: &str, field: &str, value_bytes: &[u8]) -> Vec<u8> {
    encode_tuple(&[
        KeyPart::str(collection),
        KeyPart::str(INDEX_ENTRY_MARKER),
        KeyPart::str(field),
        KeyPart::bytes(value_bytes.to_vec()),
    ])
}

/// Prefix covering every index entry of a collection, for drops.
pub fn index_entries_prefix(collection: &str) -> Vec<u8> {
    encode_tuple(&[KeyPart::str(collection), KeyPart::str(INDEX_ENTRY_MARKER)])
}

/// `[start, end)` bounds for an ordered scan of index entries whose
/// serialized value lies within the given (optionally open) bounds.
pub fn index_range_bounds(
    collection: &str,
    field: &str,
    lower: Option<(&[u8], bool)>,
    upper: Option<(&[u8], bool)>,
) -> (Vec<u8>, Vec<u8>) {
    let parts = index_field_parts(collection, field);
    let start = match lower {
        Some((value, true)) => bytes_bound_before(&parts, value),
        Some((value, false)) => bytes_bound_after(&parts, value),
        None => encode_tuple(&parts),
    };
    let end = match upper {
        Some((value, true)) => bytes_bound_after(&parts, value),
        Some((value, false)) => bytes_bound_before(&parts, value),
        None => prefix_successor(&encode_tuple(&parts)).unwrap_or_default(),
    };
    (start, end)
}

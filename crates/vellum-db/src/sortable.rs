//! Order-preserving serialization of indexed values.
//!
//! Each encoded value is a kind tag byte followed by an
//! order-preserving payload, so byte-level comparison of entries under
//! one index prefix matches value ordering: within a kind the payload
//! orders naturally, and across kinds the tags impose the comparison
//! brackets (null < number < string < complex < binary < object-id <
//! boolean < timestamp).
//!
//! The three number kinds unify through IEEE-754 doubles (sign-flip
//! big-endian), so `Int64(2)`, `Int32(2)` and `Double(2.0)` serialize
//! identically and an exact-match scan finds them all. Integers beyond
//! 2^53 collapse to the nearest double; the executor's re-verification
//! filters any resulting false candidates.

use bson::Bson;

const TAG_NULL: u8 = 0x05;
const TAG_NUMBER: u8 = 0x0A;
const TAG_STRING: u8 = 0x0F;
const TAG_COMPLEX: u8 = 0x14;
const TAG_BINARY: u8 = 0x19;
const TAG_OBJECT_ID: u8 = 0x1E;
const TAG_BOOLEAN: u8 = 0x23;
const TAG_TIMESTAMP: u8 = 0x28;

#[inline]
fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits // negative: flip all bits
    } else {
        bits ^ 0x8000_0000_0000_0000 // positive: flip sign bit
    };
    encoded.to_be_bytes()
}

#[inline]
fn encode_i64_sortable(n: i64) -> [u8; 8] {
    ((n as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

/// The sentinel a missing (or null) field serializes to. Non-sparse
/// indexes store it so absent fields remain addressable.
pub fn sentinel() -> Vec<u8> {
    vec![TAG_NULL]
}

pub fn is_sentinel(bytes: &[u8]) -> bool {
    bytes == [TAG_NULL]
}

/// Serialize one value into its ordering-bearing byte form.
pub fn encode(value: &Bson) -> Vec<u8> {
    match value {
        Bson::Null => sentinel(),
        Bson::Int32(n) => number(*n as f64),
        Bson::Int64(n) => number(*n as f64),
        Bson::Double(f) => number(*f),
        Bson::String(s) => {
            let mut out = Vec::with_capacity(1 + s.len());
            out.push(TAG_STRING);
            out.extend_from_slice(s.as_bytes());
            out
        }
        Bson::Binary(bin) => {
            let mut out = Vec::with_capacity(1 + bin.bytes.len());
            out.push(TAG_BINARY);
            out.extend_from_slice(&bin.bytes);
            out
        }
        Bson::ObjectId(oid) => {
            let mut out = Vec::with_capacity(13);
            out.push(TAG_OBJECT_ID);
            out.extend_from_slice(&oid.bytes());
            out
        }
        Bson::Boolean(b) => vec![TAG_BOOLEAN, *b as u8],
        Bson::DateTime(dt) => {
            let mut out = Vec::with_capacity(9);
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&encode_i64_sortable(dt.timestamp_millis()));
            out
        }
        // Documents and nested arrays serialize as their canonical
        // order-preserved JSON text. Equality-addressable, ordering
        // merely deterministic.
        other => {
            let text = other.to_string();
            let mut out = Vec::with_capacity(1 + text.len());
            out.push(TAG_COMPLEX);
            out.extend_from_slice(text.as_bytes());
            out
        }
    }
}

fn number(f: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(TAG_NUMBER);
    out.extend_from_slice(&encode_f64_sortable(f));
    out
}

/// Kind-bracket bound: the smallest encoding strictly above every value
/// of the same kind as `encoded`. Used to close one-sided range scans
/// so they stay within the operand's comparison bracket.
pub fn kind_upper_bound(encoded: &[u8]) -> Vec<u8> {
    vec![encoded.first().copied().unwrap_or(TAG_NULL) + 1]
}

/// Kind-bracket bound: the smallest encoding of the same kind as
/// `encoded`.
pub fn kind_lower_bound(encoded: &[u8]) -> Vec<u8> {
    vec![encoded.first().copied().unwrap_or(TAG_NULL)]
}

//! Plan execution: stream candidate entries, resolve them to primary
//! records, and verify each against the full filter.
//!
//! Index entries are only ever hints. Every candidate is re-fetched by
//! id and re-run through the filter evaluator, so stale entries are
//! skipped and trailing compound predicates need no special handling.

use std::collections::HashSet;

use bson::oid::ObjectId;
use bson::Document;
use tracing::trace;
use vellum_kv::{Kv, Versionstamp};
use vellum_query::{matches, Filter};

use crate::error::DbError;
use crate::keys;
use crate::plan::Plan;
use crate::record;
use crate::sortable;

/// A verified match, carrying the versionstamp the write coordinator
/// guards its batch with.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub doc: Document,
    pub version: Versionstamp,
}

/// Run `plan`, verify with `filter`, and return matches in discovery
/// order.
pub(crate) fn execute<K: Kv>(
    kv: &K,
    collection: &str,
    plan: &Plan,
    filter: &Filter,
) -> Result<Vec<Candidate>, DbError> {
    let candidates = match plan {
        Plan::IdLookup(ids) => fetch_ids(kv, collection, ids.iter().copied())?,
        Plan::IndexExact { field, values } => {
            let mut ids = Vec::new();
            for value in values {
                let prefix = keys::index_value_prefix(collection, field, value);
                for entry in kv.list_prefix(&prefix)? {
                    ids.push(record::index_entry_id(&entry?.value)?);
                }
            }
            fetch_ids(kv, collection, ids.into_iter())?
        }
        Plan::IndexRange { field, lower, upper } => {
            let ids = range_scan_ids(kv, collection, field, lower, upper)?;
            fetch_ids(kv, collection, ids.into_iter())?
        }
        Plan::FullScan => {
            let (start, end) = keys::document_range(collection);
            let mut out = Vec::new();
            for entry in kv.list(&start, &end)? {
                let entry = entry?;
                out.push(Candidate {
                    doc: record::decode_document(&entry.value)?,
                    version: entry.version,
                });
            }
            out
        }
    };

    let scanned = candidates.len();
    let verified: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| matches(&c.doc, filter))
        .collect();
    trace!(
        collection,
        plan = plan.kind(),
        scanned,
        matched = verified.len(),
        "plan executed"
    );
    Ok(verified)
}

/// Ids referenced by index entries within the encoded value bounds.
/// One-sided ranges are closed at the operand's kind bracket so the
/// scan never wanders into other value kinds.
fn range_scan_ids<K: Kv>(
    kv: &K,
    collection: &str,
    field: &str,
    lower: &Option<(Vec<u8>, bool)>,
    upper: &Option<(Vec<u8>, bool)>,
) -> Result<Vec<ObjectId>, DbError> {
    let bracket = lower
        .as_ref()
        .or(upper.as_ref())
        .map(|(encoded, _)| encoded.as_slice())
        .unwrap_or_default();
    let lower = match lower {
        Some((encoded, inclusive)) => (encoded.clone(), *inclusive),
        None => (sortable::kind_lower_bound(bracket), true),
    };
    let upper = match upper {
        Some((encoded, inclusive)) => (encoded.clone(), *inclusive),
        None => (sortable::kind_upper_bound(bracket), false),
    };

    let (start, end) = keys::index_range_bounds(
        collection,
        field,
        Some((&lower.0, lower.1)),
        Some((&upper.0, upper.1)),
    );
    let mut ids = Vec::new();
    for entry in kv.list(&start, &end)? {
        ids.push(record::index_entry_id(&entry?.value)?);
    }
    Ok(ids)
}

/// Resolve candidate ids to primary records, deduplicating (multi-key
/// indexes may surface an id more than once) and skipping ids whose
/// record is gone.
fn fetch_ids<K: Kv>(
    kv: &K,
    collection: &str,
    ids: impl Iterator<Item = ObjectId>,
) -> Result<Vec<Candidate>, DbError> {
    let mut seen: HashSet<[u8; 12]> = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if !seen.insert(id.bytes()) {
            continue;
        }
        if let Some((bytes, version)) = kv.get(&keys::document_key(collection, &id))? {
            out.push(Candidate {
                doc: record::decode_document(&bytes)?,
                version,
            });
        }
    }
    Ok(out)
}

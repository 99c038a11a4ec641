//! Index-delta staging and uniqueness checks for the write
//! coordinator. Every write assembles one [`AtomicWrite`]: the primary
//! check and set/delete plus, per indexed field, the entry deletes and
//! sets that keep the index ranges consistent with the new document
//! state.

use bson::oid::ObjectId;
use bson::Document;
use vellum_kv::{AtomicWrite, Kv};

use crate::catalog::Catalog;
use crate::error::DbError;
use crate::index::field_index_values;
use crate::keys;
use crate::record;
use crate::sortable;

/// Stage entry sets for a brand-new document.
pub(crate) fn stage_index_inserts(
    batch: &mut AtomicWrite,
    catalog: &Catalog,
    collection: &str,
    doc: &Document,
    id: &ObjectId,
) -> Result<(), DbError> {
    let entry_value = record::index_entry_value(id)?;
    for field in catalog.indexed_fields() {
        for value in field_index_values(doc, field, catalog.field_is_sparse(field)) {
            batch.set(
                keys::index_entry_key(collection, field, &value, id),
                entry_value.clone(),
            );
        }
    }
    Ok(())
}

/// Stage entry deletes for a document about to disappear.
pub(crate) fn stage_index_deletes(
    batch: &mut AtomicWrite,
    catalog: &Catalog,
    collection: &str,
    doc: &Document,
    id: &ObjectId,
) {
    for field in catalog.indexed_fields() {
        for value in field_index_values(doc, field, catalog.field_is_sparse(field)) {
            batch.delete(keys::index_entry_key(collection, field, &value, id));
        }
    }
}

/// Stage the delta between two document states: delete entries only the
/// old state had, set entries only the new state has.
pub(crate) fn stage_index_deltas(
    batch: &mut AtomicWrite,
    catalog: &Catalog,
    collection: &str,
    old_doc: &Document,
    new_doc: &Document,
    id: &ObjectId,
) -> Result<(), DbError> {
    let entry_value = record::index_entry_value(id)?;
    for field in catalog.indexed_fields() {
        let sparse = catalog.field_is_sparse(field);
        let old_values = field_index_values(old_doc, field, sparse);
        let new_values = field_index_values(new_doc, field, sparse);
        for gone in old_values.difference(&new_values) {
            batch.delete(keys::index_entry_key(collection, field, gone, id));
        }
        for fresh in new_values.difference(&old_values) {
            batch.set(
                keys::index_entry_key(collection, field, fresh, id),
                entry_value.clone(),
            );
        }
    }
    Ok(())
}

/// Verify the new document state violates no unique index: for every
/// unique field value (the missing sentinel included — a dense unique
/// index admits one absent-field document), any existing entry under
/// that value prefix must reference `id` itself.
///
/// This is a pre-commit scan; the batch's primary-record check closes
/// the race window, surfacing concurrent conflicts as commit failure.
pub(crate) fn check_unique<K: Kv>(
    kv: &K,
    catalog: &Catalog,
    collection: &str,
    doc: &Document,
    id: &ObjectId,
) -> Result<(), DbError> {
    for field in catalog.unique_fields() {
        let sparse = catalog.field_is_sparse(field);
        for value in field_index_values(doc, field, sparse) {
            if sparse && sortable::is_sentinel(&value) {
                continue;
            }
            let prefix = keys::index_value_prefix(collection, field, &value);
            for entry in kv.list_prefix(&prefix)? {
                let existing = record::index_entry_id(&entry?.value)?;
                if existing != *id {
                    return Err(DbError::DuplicateKey(field.to_string()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexDefinition, IndexOptions, IndexSpec};
    use bson::doc;
    use vellum_kv::MemoryKv;

    fn catalog(keys: bson::Document, options: IndexOptions) -> Catalog {
        let mut catalog = Catalog::default();
        catalog.add(IndexDefinition::new(
            IndexSpec::parse(&keys).unwrap(),
            options,
        ));
        catalog
    }

    fn entry_count(kv: &MemoryKv, collection: &str, field: &str) -> usize {
        kv.list_prefix(&keys::index_field_prefix(collection, field))
            .unwrap()
            .count()
    }

    #[test]
    fn insert_then_delta_then_delete_leaves_no_entries() {
        let kv = MemoryKv::new();
        let catalog = catalog(doc! { "name": 1 }, IndexOptions::default());
        let id = ObjectId::new();

        let doc1 = doc! { "_id": id, "name": "Alice" };
        let mut batch = AtomicWrite::new();
        stage_index_inserts(&mut batch, &catalog, "c", &doc1, &id).unwrap();
        assert!(batch.commit(&kv).unwrap().is_committed());
        assert_eq!(entry_count(&kv, "c", "name"), 1);

        // Value change replaces the entry.
        let doc2 = doc! { "_id": id, "name": "Bob" };
        let mut batch = AtomicWrite::new();
        stage_index_deltas(&mut batch, &catalog, "c", &doc1, &doc2, &id).unwrap();
        assert!(batch.commit(&kv).unwrap().is_committed());
        assert_eq!(entry_count(&kv, "c", "name"), 1);

        let mut batch = AtomicWrite::new();
        stage_index_deletes(&mut batch, &catalog, "c", &doc2, &id);
        assert!(batch.commit(&kv).unwrap().is_committed());
        assert_eq!(entry_count(&kv, "c", "name"), 0);
    }

    #[test]
    fn unchanged_value_stages_nothing() {
        let catalog = catalog(doc! { "name": 1 }, IndexOptions::default());
        let id = ObjectId::new();
        let doc1 = doc! { "_id": id, "name": "Alice", "age": 1 };
        let doc2 = doc! { "_id": id, "name": "Alice", "age": 2 };
        let mut batch = AtomicWrite::new();
        stage_index_deltas(&mut batch, &catalog, "c", &doc1, &doc2, &id).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn array_delta_is_element_wise() {
        let kv = MemoryKv::new();
        let catalog = catalog(doc! { "tags": 1 }, IndexOptions::default());
        let id = ObjectId::new();

        let doc1 = doc! { "_id": id, "tags": ["rust", "db"] };
        let mut batch = AtomicWrite::new();
        stage_index_inserts(&mut batch, &catalog, "c", &doc1, &id).unwrap();
        batch.commit(&kv).unwrap();
        assert_eq!(entry_count(&kv, "c", "tags"), 2);

        let doc2 = doc! { "_id": id, "tags": ["rust", "engine"] };
        let mut batch = AtomicWrite::new();
        stage_index_deltas(&mut batch, &catalog, "c", &doc1, &doc2, &id).unwrap();
        batch.commit(&kv).unwrap();
        assert_eq!(entry_count(&kv, "c", "tags"), 2);
    }

    #[test]
    fn missing_field_writes_sentinel_unless_sparse() {
        let kv = MemoryKv::new();
        let dense = catalog(doc! { "email": 1 }, IndexOptions::default());
        let id = ObjectId::new();
        let doc = doc! { "_id": id };

        let mut batch = AtomicWrite::new();
        stage_index_inserts(&mut batch, &dense, "c", &doc, &id).unwrap();
        batch.commit(&kv).unwrap();
        assert_eq!(entry_count(&kv, "c", "email"), 1);

        let kv = MemoryKv::new();
        let sparse = catalog(
            doc! { "email": 1 },
            IndexOptions {
                sparse: true,
                ..Default::default()
            },
        );
        let mut batch = AtomicWrite::new();
        stage_index_inserts(&mut batch, &sparse, "c", &doc, &id).unwrap();
        batch.commit(&kv).unwrap();
        assert_eq!(entry_count(&kv, "c", "email"), 0);
    }

    #[test]
    fn unique_check_flags_other_id_only() {
        let kv = MemoryKv::new();
        let catalog = catalog(
            doc! { "email": 1 },
            IndexOptions {
                unique: true,
                ..Default::default()
            },
        );
        let id = ObjectId::new();
        let doc = doc! { "_id": id, "email": "e@x" };

        let mut batch = AtomicWrite::new();
        stage_index_inserts(&mut batch, &catalog, "c", &doc, &id).unwrap();
        batch.commit(&kv).unwrap();

        // Same id re-checking its own value: fine.
        assert!(check_unique(&kv, &catalog, "c", &doc, &id).is_ok());

        // Different id with the same value: duplicate.
        let other = ObjectId::new();
        let clash = doc! { "_id": other, "email": "e@x" };
        match check_unique(&kv, &catalog, "c", &clash, &other) {
            Err(DbError::DuplicateKey(field)) => assert_eq!(field, "email"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }

        // Different value: fine.
        let fresh = doc! { "_id": other, "email": "f@x" };
        assert!(check_unique(&kv, &catalog, "c", &fresh, &other).is_ok());
    }
}

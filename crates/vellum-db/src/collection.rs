//! The collection surface: document CRUD, queries, counts, distinct,
//! and index administration over the host KV.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use tracing::debug;
use vellum_kv::{AtomicWrite, Commit, Kv, KvError};
use vellum_query::{
    compare_documents, documents_equal, parse_filter, parse_projection, parse_sort, parse_update,
    resolve, sort_order, validate_document, Direction, Filter, Resolved, Update,
};

use crate::catalog::Catalog;
use crate::error::{DbError, WriteError};
use crate::executor::{self, Candidate};
use crate::index::{
    field_index_values, IndexDefinition, IndexField, IndexOptions, IndexSpec, PRIMARY_INDEX_NAME,
};
use crate::keys;
use crate::options::{CountOptions, FindOptions, InsertManyOptions, UpdateOptions};
use crate::plan;
use crate::record;
use crate::result::{
    DeleteResult, InsertManyResult, InsertOneResult, UpdateManyResult, UpdateResult,
};
use crate::sortable;
use crate::write;

/// A named set of documents over a shared KV handle. Cheap to open;
/// declared indexes are cached at open time and kept coherent across
/// `create_index` / `drop_index`.
pub struct Collection<K: Kv> {
    kv: Arc<K>,
    name: String,
    catalog: RwLock<Catalog>,
}

impl<K: Kv> Collection<K> {
    pub(crate) fn open(kv: Arc<K>, name: &str) -> Result<Self, DbError> {
        if name.is_empty() || name.starts_with("__") {
            return Err(DbError::InvalidInput(format!(
                "invalid collection name: '{name}'"
            )));
        }
        let catalog = Catalog::load(&*kv, name)?;
        Ok(Collection {
            kv,
            name: name.to_string(),
            catalog: RwLock::new(catalog),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Find every document matching `filter`, then sort, skip, limit,
    /// and project in that order.
    pub fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>, DbError> {
        let filter = parse_filter(filter)?;
        let mut candidates = self.query_candidates(&filter)?;

        if let Some(sort_doc) = &options.sort {
            let sort_keys = parse_sort(sort_doc)?;
            candidates.sort_by(|a, b| {
                compare_documents(&a.doc, &b.doc, &sort_keys)
                    // Object-id tie-break keeps result order deterministic.
                    .then_with(|| sort_order(a.doc.get("_id"), b.doc.get("_id")))
            });
        }

        let projection = options
            .projection
            .as_ref()
            .map(|p| parse_projection(p))
            .transpose()?;

        let docs = candidates
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|c| match &projection {
                Some(projection) => projection.apply(&c.doc),
                None => c.doc,
            })
            .collect();
        Ok(docs)
    }

    /// First matching document, or `None`.
    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, DbError> {
        let filter = parse_filter(filter)?;
        Ok(self.first_match(&filter)?.map(|c| c.doc))
    }

    /// Count matching documents, honoring `skip` and `limit`.
    pub fn count_documents(
        &self,
        filter: &Document,
        options: CountOptions,
    ) -> Result<u64, DbError> {
        let filter = parse_filter(filter)?;
        let matched = self.query_candidates(&filter)?.len();
        let mut count = matched.saturating_sub(options.skip.unwrap_or(0));
        if let Some(limit) = options.limit {
            count = count.min(limit);
        }
        Ok(count as u64)
    }

    /// Key-range count of the collection's primary range; no filter
    /// evaluation, no document decoding.
    pub fn estimated_document_count(&self) -> Result<u64, DbError> {
        let (start, end) = keys::document_range(&self.name);
        let mut count = 0u64;
        for entry in self.kv.list(&start, &end)? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Deduplicated values of `field` across matching documents,
    /// array-valued fields flattened into their elements.
    pub fn distinct(&self, field: &str, filter: &Document) -> Result<Vec<Bson>, DbError> {
        let filter = parse_filter(filter)?;
        let candidates = self.query_candidates(&filter)?;

        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut out = Vec::new();
        for candidate in &candidates {
            let values: Vec<&Bson> = match resolve(&candidate.doc, field) {
                Resolved::Missing => continue,
                Resolved::One(Bson::Array(items)) => items.iter().collect(),
                Resolved::One(value) => vec![value],
                Resolved::Spread(values) => values,
            };
            for value in values {
                if seen.insert(sortable::encode(value)) {
                    out.push(value.clone());
                }
            }
        }
        Ok(out)
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Insert one document, generating an `_id` when absent.
    pub fn insert_one(&self, mut doc: Document) -> Result<InsertOneResult, DbError> {
        validate_document(&doc)?;
        let id = record::normalize_id(&mut doc)?;
        self.insert_document(&doc, &id)?;
        debug!(collection = %self.name, id = %id, "document inserted");
        Ok(InsertOneResult { inserted_id: id })
    }

    /// Insert a batch. Ordered mode halts at the first failure keeping
    /// prior successes; unordered mode collects every failure with its
    /// input index.
    pub fn insert_many(
        &self,
        docs: Vec<Document>,
        options: InsertManyOptions,
    ) -> Result<InsertManyResult, DbError> {
        let mut inserted_ids = Vec::with_capacity(docs.len());
        let mut write_errors = Vec::new();
        for (index, doc) in docs.into_iter().enumerate() {
            match self.insert_one(doc) {
                Ok(result) => inserted_ids.push(result.inserted_id),
                Err(error) => {
                    write_errors.push(WriteError { index, error });
                    if options.ordered {
                        break;
                    }
                }
            }
        }
        Ok(InsertManyResult {
            inserted_ids,
            write_errors,
        })
    }

    /// Update the first matching document; with `upsert`, synthesize
    /// and insert one when nothing matches.
    pub fn update_one(
        &self,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        let filter = parse_filter(filter)?;
        let update = parse_update(update)?;

        match self.first_match(&filter)? {
            Some(candidate) => {
                let new_doc = update.apply(&candidate.doc)?;
                let modified = self.commit_new_state(&candidate, new_doc)?;
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: modified as u64,
                    upserted_id: None,
                })
            }
            None if options.upsert => self.upsert(&filter, &update),
            None => Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            }),
        }
    }

    /// Update every matching document, one atomic batch per document.
    /// Per-document failures are collected with their match index.
    pub fn update_many(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateManyResult, DbError> {
        let filter = parse_filter(filter)?;
        let update = parse_update(update)?;
        let candidates = self.query_candidates(&filter)?;

        let mut matched_count = 0;
        let mut modified_count = 0;
        let mut write_errors = Vec::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            matched_count += 1;
            let staged = update
                .apply(&candidate.doc)
                .map_err(DbError::from)
                .and_then(|new_doc| self.commit_new_state(&candidate, new_doc));
            match staged {
                Ok(true) => modified_count += 1,
                Ok(false) => {}
                Err(error) => write_errors.push(WriteError { index, error }),
            }
        }
        Ok(UpdateManyResult {
            matched_count,
            modified_count,
            write_errors,
        })
    }

    /// Replace the first matching document wholesale, preserving its
    /// `_id`.
    pub fn replace_one(
        &self,
        filter: &Document,
        replacement: &Document,
    ) -> Result<UpdateResult, DbError> {
        validate_document(replacement)?;
        let filter = parse_filter(filter)?;
        let Some(candidate) = self.first_match(&filter)? else {
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            });
        };

        let id = record::document_id(&candidate.doc)?;
        if let Some(supplied) = replacement.get("_id") {
            if supplied != &Bson::ObjectId(id) {
                return Err(DbError::InvalidInput(
                    "replacement _id must match the matched document".into(),
                ));
            }
        }
        let mut new_doc = doc! { "_id": id };
        for (key, value) in replacement {
            if key != "_id" {
                new_doc.insert(key.clone(), value.clone());
            }
        }

        let modified = self.commit_new_state(&candidate, new_doc)?;
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: modified as u64,
            upserted_id: None,
        })
    }

    /// Delete the first matching document. Not-found is a zero count,
    /// not an error.
    pub fn delete_one(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        let filter = parse_filter(filter)?;
        let Some(candidate) = self.first_match(&filter)? else {
            return Ok(DeleteResult { deleted_count: 0 });
        };
        let id = record::document_id(&candidate.doc)?;

        let catalog = self.catalog_read()?;
        let mut batch = AtomicWrite::new();
        let pk = keys::document_key(&self.name, &id);
        batch.check_version(pk.clone(), candidate.version);
        batch.delete(pk);
        write::stage_index_deletes(&mut batch, &catalog, &self.name, &candidate.doc, &id);

        match batch.commit(&*self.kv)? {
            Commit::Committed => Ok(DeleteResult { deleted_count: 1 }),
            Commit::Conflict => Err(DbError::ConcurrentModification),
        }
    }

    /// Delete every matching document in a single atomic batch: one
    /// version check per document, all-or-nothing.
    pub fn delete_many(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        let filter = parse_filter(filter)?;
        let candidates = self.query_candidates(&filter)?;
        if candidates.is_empty() {
            return Ok(DeleteResult { deleted_count: 0 });
        }

        let catalog = self.catalog_read()?;
        let mut batch = AtomicWrite::new();
        for candidate in &candidates {
            let id = record::document_id(&candidate.doc)?;
            let pk = keys::document_key(&self.name, &id);
            batch.check_version(pk.clone(), candidate.version);
            batch.delete(pk);
            write::stage_index_deletes(&mut batch, &catalog, &self.name, &candidate.doc, &id);
        }

        match batch.commit(&*self.kv)? {
            Commit::Committed => Ok(DeleteResult {
                deleted_count: candidates.len() as u64,
            }),
            Commit::Conflict => Err(DbError::ConcurrentModification),
        }
    }

    // ── Index administration ────────────────────────────────────

    /// Declare a secondary index and backfill it from existing
    /// documents. Returns the index name. A unique violation found
    /// during backfill fails the whole operation with nothing
    /// committed.
    pub fn create_index(
        &self,
        keys_doc: &Document,
        options: IndexOptions,
    ) -> Result<String, DbError> {
        let spec = IndexSpec::parse(keys_doc)?;
        let def = IndexDefinition::new(spec, options);
        let mut catalog = self.catalog_write()?;
        if def.name == PRIMARY_INDEX_NAME {
            return Err(DbError::InvalidInput(
                "the primary _id index is implicit".into(),
            ));
        }
        if catalog.get(&def.name).is_some() {
            return Err(DbError::InvalidInput(format!(
                "index already exists: {}",
                def.name
            )));
        }

        // Effective sparsity per field once this index joins: one
        // dense index anywhere forces sentinel entries.
        let effective_sparse: HashMap<&str, bool> = def
            .spec
            .fields
            .iter()
            .map(|f| {
                let covered_dense = catalog
                    .indexes()
                    .iter()
                    .any(|d| !d.options.sparse && d.spec.fields.iter().any(|g| g.path == f.path));
                (f.path.as_str(), def.options.sparse && !covered_dense)
            })
            .collect();

        let mut batch = AtomicWrite::new();
        batch.set(
            keys::index_meta_key(&self.name, &def.name),
            record::encode_document(&def.to_document()?)?,
        );

        let mut unique_seen: HashMap<(String, Vec<u8>), ObjectId> = HashMap::new();
        let (start, end) = keys::document_range(&self.name);
        for entry in self.kv.list(&start, &end)? {
            let entry = entry?;
            let document = record::decode_document(&entry.value)?;
            let id = record::document_id(&document)?;
            let entry_value = record::index_entry_value(&id)?;
            for field in &def.spec.fields {
                let sparse = effective_sparse[field.path.as_str()];
                for value in field_index_values(&document, &field.path, sparse) {
                    if def.options.unique {
                        let slot = (field.path.clone(), value.clone());
                        if let Some(holder) = unique_seen.get(&slot) {
                            if *holder != id {
                                return Err(DbError::DuplicateKey(field.path.clone()));
                            }
                        } else {
                            unique_seen.insert(slot, id);
                        }
                    }
                    batch.set(
                        keys::index_entry_key(&self.name, &field.path, &value, &id),
                        entry_value.clone(),
                    );
                }
            }
        }

        match batch.commit(&*self.kv)? {
            Commit::Committed => {}
            Commit::Conflict => return Err(DbError::ConcurrentModification),
        }
        debug!(collection = %self.name, index = %def.name, "index created");
        let name = def.name.clone();
        catalog.add(def);
        Ok(name)
    }

    /// Drop a declared index: its metadata entry, plus every index
    /// entry whose field no surviving index still covers. Sentinel
    /// entries go too when the surviving coverage is all sparse.
    pub fn drop_index(&self, name: &str) -> Result<(), DbError> {
        if name == PRIMARY_INDEX_NAME || name == "_id" {
            return Err(DbError::InvalidInput(
                "the primary _id index cannot be dropped".into(),
            ));
        }
        let mut catalog = self.catalog_write()?;
        let def = catalog
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::InvalidInput(format!("no such index: {name}")))?;

        let mut batch = AtomicWrite::new();
        batch.delete(keys::index_meta_key(&self.name, name));
        for field in &def.spec.fields {
            if !catalog.field_still_covered(&field.path, name) {
                let prefix = keys::index_field_prefix(&self.name, &field.path);
                for entry in self.kv.list_prefix(&prefix)? {
                    batch.delete(entry?.key);
                }
            } else if self.survivors_all_sparse(&catalog, &field.path, name)
                && !catalog.field_is_sparse(&field.path)
            {
                // The field flips from dense to sparse: remove its
                // missing-sentinel entries.
                let prefix =
                    keys::index_value_prefix(&self.name, &field.path, &sortable::sentinel());
                for entry in self.kv.list_prefix(&prefix)? {
                    batch.delete(entry?.key);
                }
            }
        }

        match batch.commit(&*self.kv)? {
            Commit::Committed => {}
            Commit::Conflict => return Err(DbError::ConcurrentModification),
        }
        catalog.remove(name);
        debug!(collection = %self.name, index = name, "index dropped");
        Ok(())
    }

    /// The implicit primary index followed by every declared index.
    pub fn list_indexes(&self) -> Result<Vec<IndexDefinition>, DbError> {
        let catalog = self.catalog_read()?;
        let mut out = Vec::with_capacity(1 + catalog.indexes().len());
        out.push(IndexDefinition {
            name: PRIMARY_INDEX_NAME.to_string(),
            spec: IndexSpec {
                fields: vec![IndexField {
                    path: "_id".to_string(),
                    direction: Direction::Asc,
                }],
            },
            options: IndexOptions {
                unique: true,
                sparse: false,
                name: None,
            },
        });
        out.extend(catalog.indexes().iter().cloned());
        Ok(out)
    }

    /// Remove the collection wholesale: documents, index entries, and
    /// index metadata, in one batch.
    pub fn drop(&self) -> Result<(), DbError> {
        let mut catalog = self.catalog_write()?;
        let mut batch = AtomicWrite::new();
        let (start, end) = keys::document_range(&self.name);
        for entry in self.kv.list(&start, &end)? {
            batch.delete(entry?.key);
        }
        for entry in self.kv.list_prefix(&keys::index_entries_prefix(&self.name))? {
            batch.delete(entry?.key);
        }
        for entry in self.kv.list_prefix(&keys::index_meta_prefix(&self.name))? {
            batch.delete(entry?.key);
        }
        if batch.is_empty() {
            return Ok(());
        }
        match batch.commit(&*self.kv)? {
            Commit::Committed => {
                *catalog = Catalog::default();
                Ok(())
            }
            Commit::Conflict => Err(DbError::ConcurrentModification),
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn catalog_read(&self) -> Result<RwLockReadGuard<'_, Catalog>, DbError> {
        self.catalog
            .read()
            .map_err(|_| DbError::Kv(KvError::Storage("catalog lock poisoned".into())))
    }

    fn catalog_write(&self) -> Result<RwLockWriteGuard<'_, Catalog>, DbError> {
        self.catalog
            .write()
            .map_err(|_| DbError::Kv(KvError::Storage("catalog lock poisoned".into())))
    }

    fn query_candidates(&self, filter: &Filter) -> Result<Vec<Candidate>, DbError> {
        let catalog = self.catalog_read()?;
        let plan = plan::plan_query(filter, &catalog);
        debug!(collection = %self.name, plan = plan.kind(), "plan selected");
        executor::execute(&*self.kv, &self.name, &plan, filter)
    }

    fn first_match(&self, filter: &Filter) -> Result<Option<Candidate>, DbError> {
        let mut candidates = self.query_candidates(filter)?;
        if candidates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(candidates.remove(0)))
        }
    }

    /// Commit `doc` as a new record: primary-absent check, primary set,
    /// index entry sets, unique pre-checks. A commit conflict here is a
    /// concurrent insert of the same id.
    fn insert_document(&self, doc: &Document, id: &ObjectId) -> Result<(), DbError> {
        let catalog = self.catalog_read()?;
        write::check_unique(&*self.kv, &catalog, &self.name, doc, id)?;

        let mut batch = AtomicWrite::new();
        let pk = keys::document_key(&self.name, id);
        batch.check_absent(pk.clone());
        batch.set(pk, record::encode_document(doc)?);
        write::stage_index_inserts(&mut batch, &catalog, &self.name, doc, id)?;

        match batch.commit(&*self.kv)? {
            Commit::Committed => Ok(()),
            Commit::Conflict => Err(DbError::DuplicateKey("_id".into())),
        }
    }

    /// Commit a new state for an existing record under its read
    /// version. Returns whether anything actually changed.
    fn commit_new_state(
        &self,
        candidate: &Candidate,
        new_doc: Document,
    ) -> Result<bool, DbError> {
        validate_document(&new_doc)?;
        if documents_equal(&candidate.doc, &new_doc) {
            return Ok(false);
        }
        let id = record::document_id(&candidate.doc)?;

        let catalog = self.catalog_read()?;
        write::check_unique(&*self.kv, &catalog, &self.name, &new_doc, &id)?;

        let mut batch = AtomicWrite::new();
        let pk = keys::document_key(&self.name, &id);
        batch.check_version(pk.clone(), candidate.version);
        batch.set(pk, record::encode_document(&new_doc)?);
        write::stage_index_deltas(&mut batch, &catalog, &self.name, &candidate.doc, &new_doc, &id)?;

        match batch.commit(&*self.kv)? {
            Commit::Committed => Ok(true),
            Commit::Conflict => Err(DbError::ConcurrentModification),
        }
    }

    /// Synthesize and insert the upsert document: the filter's `_id`
    /// equality if present, `$setOnInsert` entries, then the update.
    fn upsert(&self, filter: &Filter, update: &Update) -> Result<UpdateResult, DbError> {
        let id = plan::upsert_id(filter).unwrap_or_else(ObjectId::new);
        let base = doc! { "_id": id };
        let new_doc = update.apply_for_insert(&base)?;
        validate_document(&new_doc)?;
        self.insert_document(&new_doc, &id)?;
        debug!(collection = %self.name, id = %id, "upsert inserted");
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 1,
            upserted_id: Some(id),
        })
    }

    fn survivors_all_sparse(&self, catalog: &Catalog, field: &str, dropped: &str) -> bool {
        catalog
            .indexes()
            .iter()
            .filter(|d| d.name != dropped && d.spec.fields.iter().any(|f| f.path == field))
            .all(|d| d.options.sparse)
    }
}

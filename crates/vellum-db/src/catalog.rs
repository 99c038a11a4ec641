//! Per-collection cache of declared indexes, loaded from the metadata
//! range at open time and kept coherent on create/drop. Writes consult
//! the cache, never the metadata range.

use std::collections::BTreeSet;

use bson::Document;
use vellum_kv::Kv;

use crate::error::DbError;
use crate::index::IndexDefinition;
use crate::keys;

#[derive(Debug, Default)]
pub(crate) struct Catalog {
    indexes: Vec<IndexDefinition>,
}

impl Catalog {
    /// Load declared indexes from `("__indexes__", collection, *)`.
    pub fn load<K: Kv>(kv: &K, collection: &str) -> Result<Self, DbError> {
        let mut indexes = Vec::new();
        for entry in kv.list_prefix(&keys::index_meta_prefix(collection))? {
            let entry = entry?;
            let doc = Document::from_reader(&entry.value[..])
                .map_err(|e| DbError::InvalidInput(format!("corrupt index metadata: {e}")))?;
            indexes.push(IndexDefinition::from_document(doc)?);
        }
        Ok(Catalog { indexes })
    }

    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|def| def.name == name)
    }

    pub fn add(&mut self, def: IndexDefinition) {
        self.indexes.push(def);
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexDefinition> {
        let at = self.indexes.iter().position(|def| def.name == name)?;
        Some(self.indexes.remove(at))
    }

    /// Union of every field path any declared index covers. Index
    /// entries are maintained per field, shared across indexes.
    pub fn indexed_fields(&self) -> BTreeSet<&str> {
        self.indexes
            .iter()
            .flat_map(|def| def.spec.fields.iter().map(|f| f.path.as_str()))
            .collect()
    }

    /// A field is effectively sparse only when every index covering it
    /// is sparse; a single dense index forces sentinel entries.
    pub fn field_is_sparse(&self, field: &str) -> bool {
        let mut covered = false;
        for def in &self.indexes {
            if def.spec.fields.iter().any(|f| f.path == field) {
                covered = true;
                if !def.options.sparse {
                    return false;
                }
            }
        }
        covered
    }

    /// Fields whose values must stay unique: any field of a unique
    /// index.
    pub fn unique_fields(&self) -> BTreeSet<&str> {
        self.indexes
            .iter()
            .filter(|def| def.options.unique)
            .flat_map(|def| def.spec.fields.iter().map(|f| f.path.as_str()))
            .collect()
    }

    /// Whether any *other* surviving index still covers `field`; guards
    /// entry deletion on drop.
    pub fn field_still_covered(&self, field: &str, dropped: &str) -> bool {
        self.indexes
            .iter()
            .filter(|def| def.name != dropped)
            .any(|def| def.spec.fields.iter().any(|f| f.path == field))
    }
}

//! Index definitions: specs, options, stable names, and extraction of
//! the serialized values a document contributes to an indexed field.

use std::collections::BTreeSet;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use vellum_query::{resolve, Direction, Resolved};

use crate::error::DbError;
use crate::sortable;

/// Name of the implicit primary index; never droppable.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

/// One `(field-path, direction)` pair of an index spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexField {
    pub path: String,
    pub direction: Direction,
}

/// Ordered field list of a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<IndexField>,
}

impl IndexSpec {
    /// Parse a keys document like `{ "age": 1 }` or `{ "a": 1, "b": -1 }`.
    pub fn parse(keys: &Document) -> Result<Self, DbError> {
        if keys.is_empty() {
            return Err(DbError::InvalidInput("index field list is empty".into()));
        }
        let mut fields = Vec::with_capacity(keys.len());
        for (path, value) in keys {
            let direction = Direction::from_bson(value).ok_or_else(|| {
                DbError::InvalidInput(format!("index direction for '{path}' must be 1 or -1"))
            })?;
            if path == "_id" {
                return Err(DbError::InvalidInput(
                    "the primary _id index is implicit".into(),
                ));
            }
            fields.push(IndexField {
                path: path.clone(),
                direction,
            });
        }
        Ok(IndexSpec { fields })
    }

    /// Stable derived name: `field_direction` pairs joined with `_`.
    pub fn derived_name(&self) -> String {
        let mut name = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                name.push('_');
            }
            name.push_str(&field.path);
            name.push('_');
            name.push_str(match field.direction {
                Direction::Asc => "1",
                Direction::Desc => "-1",
            });
        }
        name
    }

    pub fn leading_field(&self) -> &str {
        &self.fields[0].path
    }
}

/// The option set accepted by `create_index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A declared index as persisted in the metadata range and cached by
/// the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub spec: IndexSpec,
    pub options: IndexOptions,
}

impl IndexDefinition {
    pub fn new(spec: IndexSpec, options: IndexOptions) -> Self {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| spec.derived_name());
        IndexDefinition {
            name,
            spec,
            options,
        }
    }

    pub fn to_document(&self) -> Result<Document, DbError> {
        bson::to_document(self).map_err(|e| DbError::InvalidInput(e.to_string()))
    }

    pub fn from_document(doc: Document) -> Result<Self, DbError> {
        bson::from_document(doc).map_err(|e| DbError::InvalidInput(e.to_string()))
    }
}

/// The serialized values a document contributes under one indexed
/// field: one per resolved value (arrays fan out into multi-key
/// entries), deduplicated, or the missing sentinel when the path
/// resolves to nothing and the field is not effectively sparse.
pub fn field_index_values(doc: &Document, path: &str, sparse: bool) -> BTreeSet<Vec<u8>> {
    let mut out = BTreeSet::new();
    match resolve(doc, path) {
        Resolved::Missing => {
            if !sparse {
                out.insert(sortable::sentinel());
            }
        }
        Resolved::One(Bson::Array(items)) => {
            for item in items {
                out.insert(sortable::encode(item));
            }
            if items.is_empty() && !sparse {
                out.insert(sortable::sentinel());
            }
        }
        Resolved::One(value) => {
            out.insert(sortable::encode(value));
        }
        Resolved::Spread(values) => {
            for value in values {
                out.insert(sortable::encode(value));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parse_single_and_compound() {
        let spec = IndexSpec::parse(&doc! { "age": 1 }).unwrap();
        assert_eq!(spec.fields.len(), 1);
        assert_eq!(spec.derived_name(), "age_1");

        let spec = IndexSpec::parse(&doc! { "a": 1, "b": -1 }).unwrap();
        assert_eq!(spec.derived_name(), "a_1_b_-1");
        assert_eq!(spec.leading_field(), "a");
    }

    #[test]
    fn parse_rejects_empty_and_id() {
        assert!(IndexSpec::parse(&doc! {}).is_err());
        assert!(IndexSpec::parse(&doc! { "_id": 1 }).is_err());
        assert!(IndexSpec::parse(&doc! { "age": 0 }).is_err());
    }

    #[test]
    fn user_supplied_name_wins() {
        let spec = IndexSpec::parse(&doc! { "email": 1 }).unwrap();
        let def = IndexDefinition::new(
            spec,
            IndexOptions {
                unique: true,
                sparse: false,
                name: Some("uniq_email".into()),
            },
        );
        assert_eq!(def.name, "uniq_email");
    }

    #[test]
    fn definition_document_roundtrip() {
        let def = IndexDefinition::new(
            IndexSpec::parse(&doc! { "age": -1 }).unwrap(),
            IndexOptions {
                sparse: true,
                ..Default::default()
            },
        );
        let doc = def.to_document().unwrap();
        let back = IndexDefinition::from_document(doc).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn scalar_field_yields_one_value() {
        let values = field_index_values(&doc! { "age": 30 }, "age", false);
        assert_eq!(values.len(), 1);
        assert!(values.contains(&sortable::encode(&Bson::Int32(30))));
    }

    #[test]
    fn array_field_fans_out() {
        let values = field_index_values(&doc! { "tags": ["a", "b", "a"] }, "tags", false);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn missing_field_sentinel_depends_on_sparse() {
        let doc = doc! { "other": 1 };
        let dense = field_index_values(&doc, "age", false);
        assert_eq!(dense.len(), 1);
        assert!(sortable::is_sentinel(dense.iter().next().unwrap()));

        let sparse = field_index_values(&doc, "age", true);
        assert!(sparse.is_empty());
    }

    #[test]
    fn nested_path_fans_over_documents() {
        let doc = doc! { "items": [{ "sku": "A" }, { "sku": "B" }] };
        let values = field_index_values(&doc, "items.sku", false);
        assert_eq!(values.len(), 2);
    }
}

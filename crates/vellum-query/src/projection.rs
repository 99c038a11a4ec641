//! Result projection: inclusion or exclusion of dotted paths, with
//! `_id` controlled independently.

use std::collections::BTreeMap;
use std::fmt;

use bson::{Bson, Document};

/// Parse error for projection documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionParseError(pub String);

impl fmt::Display for ProjectionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projection parse error: {}", self.0)
    }
}

impl std::error::Error for ProjectionParseError {}

/// A parsed projection. Inclusion keeps the listed paths (plus `_id`
/// unless excluded); exclusion removes the listed paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include { tree: FieldTree, id: bool },
    Exclude { tree: FieldTree },
}

/// Nested view of a set of dotted paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTree {
    children: BTreeMap<String, FieldTree>,
    /// A full path ends here; deeper entries are subsumed.
    terminal: bool,
}

impl FieldTree {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.terminal = true;
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Parse a projection document like `{ "name": 1, "address.city": 1 }`
/// or `{ "secret": 0 }`. Mixing inclusion and exclusion of non-`_id`
/// fields is rejected.
pub fn parse_projection(doc: &Document) -> Result<Projection, ProjectionParseError> {
    let mut includes = FieldTree::default();
    let mut excludes = FieldTree::default();
    let mut id_included = true;

    for (path, value) in doc {
        let keep = flag(path, value)?;
        if path == "_id" {
            id_included = keep;
            continue;
        }
        if keep {
            includes.insert(path);
        } else {
            excludes.insert(path);
        }
    }

    match (includes.is_empty(), excludes.is_empty()) {
        (false, false) => Err(ProjectionParseError(
            "cannot mix inclusion and exclusion of non-_id fields".into(),
        )),
        (false, true) => Ok(Projection::Include {
            tree: includes,
            id: id_included,
        }),
        (true, false) => {
            if !id_included {
                excludes.insert("_id");
            }
            Ok(Projection::Exclude { tree: excludes })
        }
        (true, true) => {
            // Only `_id` was mentioned.
            if id_included {
                Ok(Projection::Include {
                    tree: FieldTree::default(),
                    id: true,
                })
            } else {
                excludes.insert("_id");
                Ok(Projection::Exclude { tree: excludes })
            }
        }
    }
}

fn flag(path: &str, value: &Bson) -> Result<bool, ProjectionParseError> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        _ => match crate::value::as_f64(value) {
            Some(v) => Ok(v != 0.0),
            None => Err(ProjectionParseError(format!(
                "projection value for '{path}' must be 0 or 1"
            ))),
        },
    }
}

impl Projection {
    /// Project a document. Nested paths descend through sub-documents
    /// and through arrays of sub-documents.
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::Include { tree, id } => include_document(doc, tree, *id),
            Projection::Exclude { tree } => exclude_document(doc, tree),
        }
    }
}

fn include_document(doc: &Document, tree: &FieldTree, keep_id: bool) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        if key == "_id" {
            if keep_id {
                out.insert(key.clone(), value.clone());
            }
            continue;
        }
        let Some(node) = tree.children.get(key) else {
            continue;
        };
        if node.terminal {
            out.insert(key.clone(), value.clone());
            continue;
        }
        match value {
            Bson::Document(sub) => {
                out.insert(key.clone(), Bson::Document(include_document(sub, node, true)));
            }
            Bson::Array(items) => {
                let projected = items
                    .iter()
                    .filter_map(|item| match item {
                        Bson::Document(sub) => {
                            Some(Bson::Document(include_document(sub, node, true)))
                        }
                        _ => None,
                    })
                    .collect();
                out.insert(key.clone(), Bson::Array(projected));
            }
            _ => {}
        }
    }
    out
}

fn exclude_document(doc: &Document, tree: &FieldTree) -> Document {
    let mut out = Document::new();
    for (key, value) in doc {
        match tree.children.get(key) {
            None => {
                out.insert(key.clone(), value.clone());
            }
            Some(node) if node.terminal => {}
            Some(node) => match value {
                Bson::Document(sub) => {
                    out.insert(key.clone(), Bson::Document(exclude_document(sub, node)));
                }
                Bson::Array(items) => {
                    let trimmed = items
                        .iter()
                        .map(|item| match item {
                            Bson::Document(sub) => Bson::Document(exclude_document(sub, node)),
                            other => other.clone(),
                        })
                        .collect();
                    out.insert(key.clone(), Bson::Array(trimmed));
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            },
        }
    }
    out
}

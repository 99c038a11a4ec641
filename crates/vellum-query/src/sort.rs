use std::cmp::Ordering;
use std::fmt;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::compare::sort_order;
use crate::path::resolve;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Parse a `1` / `-1` sort direction value.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match crate::value::as_f64(value)? {
            v if v > 0.0 => Some(Direction::Asc),
            v if v < 0.0 => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// One `(field, direction)` pair of a sort specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

/// Parse error for sort documents.
#[derive(Debug, Clone, PartialEq)]
pub struct SortParseError(pub String);

impl fmt::Display for SortParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sort parse error: {}", self.0)
    }
}

impl std::error::Error for SortParseError {}

/// Parse a sort document like `{ "age": -1, "name": 1 }`, order
/// significant.
pub fn parse_sort(doc: &Document) -> Result<Vec<SortKey>, SortParseError> {
    let mut keys = Vec::with_capacity(doc.len());
    for (field, value) in doc {
        let direction = Direction::from_bson(value)
            .ok_or_else(|| SortParseError(format!("sort direction for '{field}' must be 1 or -1")))?;
        keys.push(SortKey {
            field: field.clone(),
            direction,
        });
    }
    Ok(keys)
}

/// Compare two documents under a sort specification. Missing and null
/// field values order first ascending.
pub fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let va = resolve(a, &key.field);
        let vb = resolve(b, &key.field);
        let ordering = key
            .direction
            .apply(sort_order(va.single(), vb.single()));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

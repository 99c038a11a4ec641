use std::fmt;

use bson::{Bson, Document};

/// A value (or document containing one) fell outside the supported
/// model: null, boolean, int32/int64, double, string, datetime,
/// object-id, binary, array, document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueError(pub String);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported value: {}", self.0)
    }
}

impl std::error::Error for ValueError {}

/// Check a value against the supported model, recursing into arrays and
/// documents.
pub fn validate_value(value: &Bson) -> Result<(), ValueError> {
    match value {
        Bson::Null
        | Bson::Boolean(_)
        | Bson::Int32(_)
        | Bson::Int64(_)
        | Bson::Double(_)
        | Bson::String(_)
        | Bson::DateTime(_)
        | Bson::ObjectId(_)
        | Bson::Binary(_) => Ok(()),
        Bson::Array(items) => {
            for item in items {
                validate_value(item)?;
            }
            Ok(())
        }
        Bson::Document(doc) => validate_document(doc),
        other => Err(ValueError(format!(
            "{} is not a supported field type",
            type_name(other)
        ))),
    }
}

/// Check every field of a document against the supported model.
pub fn validate_document(doc: &Document) -> Result<(), ValueError> {
    for (key, value) in doc {
        validate_value(value).map_err(|e| ValueError(format!("field '{key}': {}", e.0)))?;
    }
    Ok(())
}

/// The type name a `$type` predicate matches against.
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "null",
        Bson::Boolean(_) => "boolean",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "number",
        Bson::String(_) => "string",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Binary(_) => "binData",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::RegularExpression(_) => "regex",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::DbPointer(_) => "dbPointer",
    }
}

pub fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

/// Numeric view of a value, unifying the three number kinds.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Integer view; `None` for doubles and non-numbers.
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn accepts_supported_document() {
        let doc = doc! {
            "_id": bson::oid::ObjectId::new(),
            "name": "A",
            "age": 30_i64,
            "score": 1.5,
            "active": true,
            "none": Bson::Null,
            "when": bson::DateTime::from_millis(1_700_000_000_000),
            "tags": ["x", "y"],
            "nested": { "a": 1 },
        };
        assert!(validate_document(&doc).is_ok());
    }

    #[test]
    fn rejects_unsupported_variant() {
        let doc = doc! { "d": Bson::MaxKey };
        let err = validate_document(&doc).unwrap_err();
        assert!(err.0.contains("maxKey"), "{}", err.0);
    }

    #[test]
    fn rejects_unsupported_nested_in_array() {
        let doc = doc! { "items": [1, Bson::MinKey] };
        assert!(validate_document(&doc).is_err());
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(&Bson::Int32(1)), "number");
        assert_eq!(type_name(&Bson::Int64(1)), "number");
        assert_eq!(type_name(&Bson::Double(1.0)), "number");
        assert_eq!(type_name(&Bson::String("s".into())), "string");
        assert_eq!(type_name(&Bson::Null), "null");
        assert_eq!(type_name(&Bson::Array(vec![])), "array");
    }
}

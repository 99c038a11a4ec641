//! Filter documents parsed once into a tagged expression tree, walked
//! repeatedly against streamed documents by [`crate::eval`].

use std::fmt;

use bson::{Bson, Document};

/// Parse error for filter documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter parse error: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Ordered/equality comparison operator on a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Type names recognized by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Number,
    Boolean,
    Null,
    Array,
    Date,
    ObjectId,
    Object,
}

impl TypeName {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => TypeName::String,
            "number" => TypeName::Number,
            "boolean" => TypeName::Boolean,
            "null" => TypeName::Null,
            "array" => TypeName::Array,
            "date" => TypeName::Date,
            "objectId" => TypeName::ObjectId,
            "object" => TypeName::Object,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeName::String => "string",
            TypeName::Number => "number",
            TypeName::Boolean => "boolean",
            TypeName::Null => "null",
            TypeName::Array => "array",
            TypeName::Date => "date",
            TypeName::ObjectId => "objectId",
            TypeName::Object => "object",
        }
    }
}

/// A single operator applied to a resolved field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Cmp(CmpOp, Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    Type(TypeName),
    Size(usize),
    All(Vec<Bson>),
    ElemMatch(ElementPredicate),
}

/// Predicate over one array element, shared between `$elemMatch` and
/// `$pull`. Operator documents apply to the element itself; anything
/// else is a sub-filter evaluated with the element as a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPredicate {
    Conditions(Vec<Condition>),
    Filter(Box<Filter>),
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Empty `And` matches every document.
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    /// Conditions on one dotted path, combined with AND.
    Field { path: String, conditions: Vec<Condition> },
}

impl Filter {
    /// A filter that matches every document.
    pub fn match_all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn matches_all(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }
}

/// Parse a filter document into an expression tree. Entries combine
/// with AND; an empty document matches everything.
pub fn parse_filter(doc: &Document) -> Result<Filter, FilterParseError> {
    let mut children = Vec::new();

    for (key, value) in doc {
        match key.as_str() {
            "$and" => children.push(parse_logical_array(value, Filter::And)?),
            "$or" => children.push(parse_logical_array(value, Filter::Or)?),
            "$nor" => children.push(parse_logical_array(value, Filter::Nor)?),
            "$not" => {
                let sub = match value {
                    Bson::Document(sub) => parse_filter(sub)?,
                    _ => {
                        return Err(FilterParseError("$not value must be a document".into()));
                    }
                };
                children.push(Filter::Not(Box::new(sub)));
            }
            k if k.starts_with('$') => {
                return Err(FilterParseError(format!("unknown top-level operator: {k}")));
            }
            path => children.push(parse_field_entry(path, value)?),
        }
    }

    match children.len() {
        0 => Ok(Filter::match_all()),
        1 => Ok(children.pop().expect("one child")),
        _ => Ok(Filter::And(children)),
    }
}

/// Parse a `$and`/`$or`/`$nor` array. An empty array is allowed and
/// left to the evaluator (empty AND matches everything, empty OR
/// nothing).
fn parse_logical_array(
    value: &Bson,
    make: fn(Vec<Filter>) -> Filter,
) -> Result<Filter, FilterParseError> {
    let items = match value {
        Bson::Array(items) => items,
        _ => {
            return Err(FilterParseError(
                "$and/$or/$nor value must be an array".into(),
            ));
        }
    };
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Bson::Document(sub) => children.push(parse_filter(sub)?),
            _ => {
                return Err(FilterParseError(
                    "$and/$or/$nor array elements must be documents".into(),
                ));
            }
        }
    }
    Ok(make(children))
}

/// Parse a field entry: an operator document (all keys `$`-prefixed),
/// or a literal implicitly rewritten to `$eq`.
fn parse_field_entry(path: &str, value: &Bson) -> Result<Filter, FilterParseError> {
    let conditions = match value {
        Bson::Document(sub) if is_operator_doc(sub) => parse_conditions(sub)?,
        literal => vec![Condition::Cmp(CmpOp::Eq, literal.clone())],
    };
    Ok(Filter::Field {
        path: path.to_string(),
        conditions,
    })
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

/// Parse an operator document like `{ "$gte": 25, "$lt": 40 }`.
pub(crate) fn parse_conditions(doc: &Document) -> Result<Vec<Condition>, FilterParseError> {
    let mut conditions = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        let condition = match key.as_str() {
            "$eq" => Condition::Cmp(CmpOp::Eq, value.clone()),
            "$ne" => Condition::Cmp(CmpOp::Ne, value.clone()),
            "$gt" => Condition::Cmp(CmpOp::Gt, value.clone()),
            "$gte" => Condition::Cmp(CmpOp::Gte, value.clone()),
            "$lt" => Condition::Cmp(CmpOp::Lt, value.clone()),
            "$lte" => Condition::Cmp(CmpOp::Lte, value.clone()),
            "$in" => Condition::In(operand_array(key, value)?),
            "$nin" => Condition::Nin(operand_array(key, value)?),
            "$exists" => match value {
                Bson::Boolean(b) => Condition::Exists(*b),
                _ => {
                    return Err(FilterParseError("$exists value must be a boolean".into()));
                }
            },
            "$type" => match value {
                Bson::String(name) => match TypeName::parse(name) {
                    Some(t) => Condition::Type(t),
                    None => {
                        return Err(FilterParseError(format!("unknown $type name: {name}")));
                    }
                },
                _ => return Err(FilterParseError("$type value must be a string".into())),
            },
            "$size" => match value {
                Bson::Int32(n) if *n >= 0 => Condition::Size(*n as usize),
                Bson::Int64(n) if *n >= 0 => Condition::Size(*n as usize),
                _ => {
                    return Err(FilterParseError(
                        "$size value must be a non-negative integer".into(),
                    ));
                }
            },
            "$all" => Condition::All(operand_array(key, value)?),
            "$elemMatch" => match value {
                Bson::Document(sub) => Condition::ElemMatch(parse_element_predicate(sub)?),
                _ => {
                    return Err(FilterParseError("$elemMatch value must be a document".into()));
                }
            },
            k => return Err(FilterParseError(format!("unknown field operator: {k}"))),
        };
        conditions.push(condition);
    }

    Ok(conditions)
}

/// Parse the body of `$elemMatch` / a `$pull` condition document.
pub fn parse_element_predicate(doc: &Document) -> Result<ElementPredicate, FilterParseError> {
    if is_operator_doc(doc) {
        Ok(ElementPredicate::Conditions(parse_conditions(doc)?))
    } else {
        Ok(ElementPredicate::Filter(Box::new(parse_filter(doc)?)))
    }
}

fn operand_array(op: &str, value: &Bson) -> Result<Vec<Bson>, FilterParseError> {
    match value {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(FilterParseError(format!("{op} value must be an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn bare_field_implicit_eq() {
        let filter = parse_filter(&doc! { "status": "active" }).unwrap();
        match filter {
            Filter::Field { path, conditions } => {
                assert_eq!(path, "status");
                assert_eq!(
                    conditions,
                    vec![Condition::Cmp(CmpOp::Eq, Bson::String("active".into()))]
                );
            }
            other => panic!("expected Field, got {other:?}"),
        }
    }

    #[test]
    fn multiple_entries_become_and() {
        let filter = parse_filter(&doc! { "a": 1, "b": 2 }).unwrap();
        assert!(matches!(filter, Filter::And(children) if children.len() == 2));
    }

    #[test]
    fn empty_filter_matches_all() {
        let filter = parse_filter(&doc! {}).unwrap();
        assert!(filter.matches_all());
    }

    #[test]
    fn operator_doc_multiple_conditions() {
        let filter = parse_filter(&doc! { "age": { "$gte": 25, "$lt": 40 } }).unwrap();
        match filter {
            Filter::Field { conditions, .. } => {
                assert_eq!(conditions.len(), 2);
                assert!(matches!(conditions[0], Condition::Cmp(CmpOp::Gte, _)));
                assert!(matches!(conditions[1], Condition::Cmp(CmpOp::Lt, _)));
            }
            other => panic!("expected Field, got {other:?}"),
        }
    }

    #[test]
    fn non_operator_document_is_literal_equality() {
        let filter = parse_filter(&doc! { "address": { "city": "Austin" } }).unwrap();
        match filter {
            Filter::Field { conditions, .. } => {
                assert!(matches!(&conditions[0], Condition::Cmp(CmpOp::Eq, Bson::Document(_))));
            }
            other => panic!("expected Field, got {other:?}"),
        }
    }

    #[test]
    fn logical_operators_parse() {
        let filter = parse_filter(&doc! {
            "$or": [{ "a": 1 }, { "$and": [{ "b": 2 }, { "c": 3 }] }],
        })
        .unwrap();
        match filter {
            Filter::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[1], Filter::And(sub) if sub.len() == 2));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn nor_and_not_parse() {
        let filter = parse_filter(&doc! { "$nor": [{ "a": 1 }] }).unwrap();
        assert!(matches!(filter, Filter::Nor(_)));

        let filter = parse_filter(&doc! { "$not": { "a": 1 } }).unwrap();
        assert!(matches!(filter, Filter::Not(_)));
    }

    #[test]
    fn empty_and_parses_as_match_all_group() {
        let filter = parse_filter(&doc! { "$and": [] }).unwrap();
        assert!(matches!(filter, Filter::And(children) if children.is_empty()));
    }

    #[test]
    fn unknown_top_level_operator_errors() {
        let err = parse_filter(&doc! { "$max": [{ "a": 1 }] }).unwrap_err();
        assert!(err.0.contains("unknown top-level operator"), "{}", err.0);
    }

    #[test]
    fn unknown_field_operator_errors() {
        let err = parse_filter(&doc! { "a": { "$between": 1 } }).unwrap_err();
        assert!(err.0.contains("unknown field operator"), "{}", err.0);
    }

    #[test]
    fn in_requires_array() {
        assert!(parse_filter(&doc! { "a": { "$in": 1 } }).is_err());
        assert!(parse_filter(&doc! { "a": { "$in": [1, 2] } }).is_ok());
    }

    #[test]
    fn size_rejects_negative() {
        assert!(parse_filter(&doc! { "a": { "$size": -1 } }).is_err());
    }

    #[test]
    fn elem_match_operator_body() {
        let filter = parse_filter(&doc! { "t": { "$elemMatch": { "$gt": 5 } } }).unwrap();
        match filter {
            Filter::Field { conditions, .. } => match &conditions[0] {
                Condition::ElemMatch(ElementPredicate::Conditions(conds)) => {
                    assert_eq!(conds.len(), 1);
                }
                other => panic!("expected operator predicate, got {other:?}"),
            },
            other => panic!("expected Field, got {other:?}"),
        }
    }

    #[test]
    fn elem_match_filter_body() {
        let filter =
            parse_filter(&doc! { "items": { "$elemMatch": { "sku": "A", "qty": { "$gt": 1 } } } })
                .unwrap();
        match filter {
            Filter::Field { conditions, .. } => {
                assert!(matches!(
                    &conditions[0],
                    Condition::ElemMatch(ElementPredicate::Filter(_))
                ));
            }
            other => panic!("expected Field, got {other:?}"),
        }
    }
}

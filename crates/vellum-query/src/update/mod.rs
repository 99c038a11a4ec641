//! Update documents parsed once into a validated operator tree,
//! applied as a pure transformation by [`Update::apply`].

mod apply;

use std::fmt;

use bson::{Bson, Document};

use crate::filter::{parse_element_predicate, ElementPredicate};
use crate::sort::Direction;
use crate::value::{is_number, validate_value};

pub use apply::UpdateApplyError;

/// `$push` operand with its optional modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSpec {
    pub each: Vec<Bson>,
    pub position: Option<i64>,
    pub slice: Option<i64>,
    pub sort: Option<PushSort>,
}

impl PushSpec {
    fn raw(value: Bson) -> Self {
        PushSpec {
            each: vec![value],
            position: None,
            slice: None,
            sort: None,
        }
    }
}

/// `$push.$sort` modifier: whole-value direction or per-field keys.
#[derive(Debug, Clone, PartialEq)]
pub enum PushSort {
    ByValue(Direction),
    ByFields(Vec<(String, Direction)>),
}

/// `$pull` operand: literal equality or an element predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum PullSpec {
    Equals(Bson),
    Matching(ElementPredicate),
}

/// `$pop` end selector: `-1` removes the first element, `1` the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopEnd {
    First,
    Last,
}

/// A parsed update expression. Groups are applied in field order;
/// within a group, in the order supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Vec<(String, Bson)>,
    pub unset: Vec<String>,
    pub inc: Vec<(String, Bson)>,
    pub mul: Vec<(String, Bson)>,
    pub min: Vec<(String, Bson)>,
    pub max: Vec<(String, Bson)>,
    pub rename: Vec<(String, String)>,
    pub push: Vec<(String, PushSpec)>,
    pub pull: Vec<(String, PullSpec)>,
    pub pull_all: Vec<(String, Vec<Bson>)>,
    pub pop: Vec<(String, PopEnd)>,
    pub add_to_set: Vec<(String, Vec<Bson>)>,
    /// Applied only when upserting a synthesized document.
    pub set_on_insert: Vec<(String, Bson)>,
}

/// Parse error for update documents.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParseError(pub String);

impl fmt::Display for UpdateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update parse error: {}", self.0)
    }
}

impl std::error::Error for UpdateParseError {}

/// Parse an update document into a validated [`Update`].
///
/// Operator keys map to sub-documents of `path: operand`. Bare
/// top-level fields are treated as implicit `$set`. Targeting `_id`
/// is rejected.
pub fn parse_update(doc: &Document) -> Result<Update, UpdateParseError> {
    let mut update = Update::default();
    let mut any = false;

    for (key, value) in doc {
        any = true;
        match key.as_str() {
            "$set" => parse_value_fields(value, &mut update.set)?,
            "$setOnInsert" => parse_value_fields(value, &mut update.set_on_insert)?,
            "$unset" => {
                for (path, _) in operator_doc(key, value)? {
                    guard_path(path)?;
                    update.unset.push(path.clone());
                }
            }
            "$inc" => parse_numeric_fields(key, value, &mut update.inc)?,
            "$mul" => parse_numeric_fields(key, value, &mut update.mul)?,
            "$min" => parse_value_fields(value, &mut update.min)?,
            "$max" => parse_value_fields(value, &mut update.max)?,
            "$rename" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    match operand {
                        Bson::String(target) => {
                            guard_path(target)?;
                            update.rename.push((path.clone(), target.clone()));
                        }
                        _ => {
                            return Err(UpdateParseError(format!(
                                "$rename value for '{path}' must be a string"
                            )));
                        }
                    }
                }
            }
            "$push" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    update.push.push((path.clone(), parse_push_spec(operand)?));
                }
            }
            "$pull" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    let spec = match operand {
                        Bson::Document(cond) => {
                            let predicate = parse_element_predicate(cond)
                                .map_err(|e| UpdateParseError(e.0))?;
                            PullSpec::Matching(predicate)
                        }
                        literal => PullSpec::Equals(literal.clone()),
                    };
                    update.pull.push((path.clone(), spec));
                }
            }
            "$pullAll" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    match operand {
                        Bson::Array(items) => {
                            update.pull_all.push((path.clone(), items.clone()));
                        }
                        _ => {
                            return Err(UpdateParseError(format!(
                                "$pullAll value for '{path}' must be an array"
                            )));
                        }
                    }
                }
            }
            "$pop" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    let end = match crate::value::as_i64(operand) {
                        Some(-1) => PopEnd::First,
                        Some(1) => PopEnd::Last,
                        _ => {
                            return Err(UpdateParseError(format!(
                                "$pop value for '{path}' must be 1 or -1"
                            )));
                        }
                    };
                    update.pop.push((path.clone(), end));
                }
            }
            "$addToSet" => {
                for (path, operand) in operator_doc(key, value)? {
                    guard_path(path)?;
                    let values = match operand {
                        Bson::Document(spec) if spec.contains_key("$each") => {
                            match spec.get("$each") {
                                Some(Bson::Array(items)) => items.clone(),
                                _ => {
                                    return Err(UpdateParseError(
                                        "$addToSet $each must be an array".into(),
                                    ));
                                }
                            }
                        }
                        single => vec![single.clone()],
                    };
                    for v in &values {
                        validate_operand(path, v)?;
                    }
                    update.add_to_set.push((path.clone(), values));
                }
            }
            k if k.starts_with('$') => {
                return Err(UpdateParseError(format!("unknown update operator: {k}")));
            }
            path => {
                // Bare field: implicit $set. A literal `_id` is ignored
                // so replacement-shaped documents round-trip.
                if path == "_id" {
                    continue;
                }
                guard_path(path)?;
                validate_operand(path, value)?;
                update.set.push((path.to_string(), value.clone()));
            }
        }
    }

    if !any {
        return Err(UpdateParseError("empty update document".into()));
    }

    Ok(update)
}

// ── Parse helpers ───────────────────────────────────────────────

fn operator_doc<'a>(
    op: &str,
    value: &'a Bson,
) -> Result<&'a Document, UpdateParseError> {
    match value {
        Bson::Document(doc) => Ok(doc),
        _ => Err(UpdateParseError(format!("{op} value must be a document"))),
    }
}

fn guard_path(path: &str) -> Result<(), UpdateParseError> {
    let head = path.split('.').next().unwrap_or(path);
    if head == "_id" {
        return Err(UpdateParseError("cannot update _id".into()));
    }
    if path.is_empty() {
        return Err(UpdateParseError("empty field path".into()));
    }
    Ok(())
}

fn validate_operand(path: &str, value: &Bson) -> Result<(), UpdateParseError> {
    validate_value(value)
        .map_err(|e| UpdateParseError(format!("operand for '{path}': {}", e.0)))
}

fn parse_value_fields(
    value: &Bson,
    out: &mut Vec<(String, Bson)>,
) -> Result<(), UpdateParseError> {
    let doc = operator_doc("operator", value)?;
    for (path, operand) in doc {
        guard_path(path)?;
        validate_operand(path, operand)?;
        out.push((path.clone(), operand.clone()));
    }
    Ok(())
}

fn parse_numeric_fields(
    op: &str,
    value: &Bson,
    out: &mut Vec<(String, Bson)>,
) -> Result<(), UpdateParseError> {
    let doc = operator_doc(op, value)?;
    for (path, operand) in doc {
        guard_path(path)?;
        if !is_number(operand) {
            return Err(UpdateParseError(format!(
                "{op} value for '{path}' must be numeric"
            )));
        }
        out.push((path.clone(), operand.clone()));
    }
    Ok(())
}

/// Parse a `$push` operand: a raw value, or a modifier document
/// containing `$each` plus optional `$position` / `$slice` / `$sort`.
fn parse_push_spec(operand: &Bson) -> Result<PushSpec, UpdateParseError> {
    let spec_doc = match operand {
        Bson::Document(doc) if doc.contains_key("$each") => doc,
        other => {
            validate_operand("$push", other)?;
            return Ok(PushSpec::raw(other.clone()));
        }
    };

    let mut spec = PushSpec {
        each: Vec::new(),
        position: None,
        slice: None,
        sort: None,
    };
    for (key, value) in spec_doc {
        match key.as_str() {
            "$each" => match value {
                Bson::Array(items) => {
                    for v in items {
                        validate_operand("$each", v)?;
                    }
                    spec.each = items.clone();
                }
                _ => return Err(UpdateParseError("$each must be an array".into())),
            },
            "$position" => {
                spec.position = Some(crate::value::as_i64(value).ok_or_else(|| {
                    UpdateParseError("$position must be an integer".into())
                })?);
            }
            "$slice" => {
                spec.slice = Some(crate::value::as_i64(value).ok_or_else(|| {
                    UpdateParseError("$slice must be an integer".into())
                })?);
            }
            "$sort" => {
                spec.sort = Some(parse_push_sort(value)?);
            }
            k => {
                return Err(UpdateParseError(format!("unknown $push modifier: {k}")));
            }
        }
    }
    Ok(spec)
}

fn parse_push_sort(value: &Bson) -> Result<PushSort, UpdateParseError> {
    if let Some(direction) = Direction::from_bson(value) {
        return Ok(PushSort::ByValue(direction));
    }
    match value {
        Bson::Document(doc) => {
            let mut keys = Vec::with_capacity(doc.len());
            for (field, dir) in doc {
                let direction = Direction::from_bson(dir).ok_or_else(|| {
                    UpdateParseError(format!("$sort direction for '{field}' must be 1 or -1"))
                })?;
                keys.push((field.clone(), direction));
            }
            if keys.is_empty() {
                return Err(UpdateParseError("$sort document must not be empty".into()));
            }
            Ok(PushSort::ByFields(keys))
        }
        _ => Err(UpdateParseError(
            "$sort must be 1, -1, or a field specification".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_set_and_unset() {
        let u = parse_update(&doc! { "$set": { "a": 1, "b.c": "x" }, "$unset": { "d": "" } })
            .unwrap();
        assert_eq!(u.set.len(), 2);
        assert_eq!(u.set[1].0, "b.c");
        assert_eq!(u.unset, vec!["d".to_string()]);
    }

    #[test]
    fn bare_fields_become_set() {
        let u = parse_update(&doc! { "status": "active" }).unwrap();
        assert_eq!(u.set.len(), 1);
        assert_eq!(u.set[0], ("status".into(), Bson::String("active".into())));
    }

    #[test]
    fn top_level_id_literal_is_skipped() {
        let u = parse_update(&doc! { "_id": "kept", "a": 1 }).unwrap();
        assert_eq!(u.set.len(), 1);
        assert_eq!(u.set[0].0, "a");
    }

    #[test]
    fn rejects_operator_on_id() {
        assert!(parse_update(&doc! { "$set": { "_id": 1 } }).is_err());
        assert!(parse_update(&doc! { "$inc": { "_id.sub": 1 } }).is_err());
        assert!(parse_update(&doc! { "$rename": { "a": "_id" } }).is_err());
    }

    #[test]
    fn inc_and_mul_require_numbers() {
        assert!(parse_update(&doc! { "$inc": { "n": "one" } }).is_err());
        assert!(parse_update(&doc! { "$mul": { "n": true } }).is_err());
        assert!(parse_update(&doc! { "$inc": { "n": 2.5 } }).is_ok());
    }

    #[test]
    fn push_raw_value() {
        let u = parse_update(&doc! { "$push": { "tags": "x" } }).unwrap();
        assert_eq!(u.push[0].1.each, vec![Bson::String("x".into())]);
        assert!(u.push[0].1.position.is_none());
    }

    #[test]
    fn push_with_modifiers() {
        let u = parse_update(&doc! {
            "$push": { "scores": { "$each": [7, 9], "$position": 0, "$slice": -3, "$sort": 1 } }
        })
        .unwrap();
        let spec = &u.push[0].1;
        assert_eq!(spec.each.len(), 2);
        assert_eq!(spec.position, Some(0));
        assert_eq!(spec.slice, Some(-3));
        assert_eq!(spec.sort, Some(PushSort::ByValue(Direction::Asc)));
    }

    #[test]
    fn push_document_without_each_is_raw() {
        let u = parse_update(&doc! { "$push": { "items": { "sku": "A" } } }).unwrap();
        assert_eq!(u.push[0].1.each.len(), 1);
        assert!(matches!(u.push[0].1.each[0], Bson::Document(_)));
    }

    #[test]
    fn push_rejects_unknown_modifier() {
        let err =
            parse_update(&doc! { "$push": { "t": { "$each": [1], "$skip": 2 } } }).unwrap_err();
        assert!(err.0.contains("unknown $push modifier"), "{}", err.0);
    }

    #[test]
    fn pull_literal_and_condition() {
        let u = parse_update(&doc! { "$pull": { "t": 2, "items": { "qty": { "$lt": 1 } } } })
            .unwrap();
        assert!(matches!(u.pull[0].1, PullSpec::Equals(Bson::Int32(2))));
        assert!(matches!(u.pull[1].1, PullSpec::Matching(_)));
    }

    #[test]
    fn pop_requires_unit() {
        assert!(parse_update(&doc! { "$pop": { "t": 2 } }).is_err());
        let u = parse_update(&doc! { "$pop": { "t": -1 } }).unwrap();
        assert_eq!(u.pop[0].1, PopEnd::First);
    }

    #[test]
    fn add_to_set_each() {
        let u = parse_update(&doc! { "$addToSet": { "t": { "$each": [1, 2] } } }).unwrap();
        assert_eq!(u.add_to_set[0].1.len(), 2);
    }

    #[test]
    fn set_on_insert_is_separate() {
        let u = parse_update(&doc! { "$setOnInsert": { "created": true }, "$set": { "a": 1 } })
            .unwrap();
        assert_eq!(u.set_on_insert.len(), 1);
        assert_eq!(u.set.len(), 1);
    }

    #[test]
    fn rejects_unknown_operator_and_empty() {
        assert!(parse_update(&doc! { "$bump": { "a": 1 } }).is_err());
        assert!(parse_update(&doc! {}).is_err());
    }
}

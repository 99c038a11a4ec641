//! Recursive filter evaluation over parsed expression trees.

use bson::{Bson, Document};

use crate::compare::{compare_ordered, values_equal};
use crate::filter::{CmpOp, Condition, ElementPredicate, Filter, TypeName};
use crate::path::{resolve, Resolved};
use crate::value::is_number;

/// Evaluate whether `doc` matches `filter`.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(doc, c)),
        Filter::Or(children) => children.iter().any(|c| matches(doc, c)),
        Filter::Nor(children) => !children.iter().any(|c| matches(doc, c)),
        Filter::Not(child) => !matches(doc, child),
        Filter::Field { path, conditions } => {
            let resolved = resolve(doc, path);
            conditions.iter().all(|c| eval_condition(&resolved, c))
        }
    }
}

/// Evaluate an element predicate (from `$elemMatch` or `$pull`) against
/// one array element.
pub fn element_matches(element: &Bson, predicate: &ElementPredicate) -> bool {
    match predicate {
        ElementPredicate::Conditions(conditions) => {
            let resolved = Resolved::One(element);
            conditions.iter().all(|c| eval_condition(&resolved, c))
        }
        ElementPredicate::Filter(filter) => match element {
            Bson::Document(doc) => matches(doc, filter),
            _ => false,
        },
    }
}

fn eval_condition(resolved: &Resolved<'_>, condition: &Condition) -> bool {
    match condition {
        Condition::Cmp(CmpOp::Eq, target) => eval_eq(resolved, target),
        Condition::Cmp(CmpOp::Ne, target) => !eval_eq(resolved, target),
        Condition::Cmp(op, target) => candidates(resolved)
            .iter()
            .any(|v| ordered_matches(*op, v, target)),
        Condition::In(list) => eval_in(resolved, list),
        Condition::Nin(list) => !eval_in(resolved, list),
        Condition::Exists(expected) => resolved.exists() == *expected,
        Condition::Type(t) => resolved.values().iter().any(|v| matches_type(v, *t)),
        Condition::Size(n) => match elements(resolved) {
            Some(items) => items.len() == *n,
            None => false,
        },
        Condition::All(list) => match elements(resolved) {
            Some(items) => list
                .iter()
                .all(|t| items.iter().any(|v| values_equal(v, t))),
            None => false,
        },
        Condition::ElemMatch(predicate) => match elements(resolved) {
            Some(items) => items.iter().any(|v| element_matches(v, predicate)),
            None => false,
        },
    }
}

/// `$in` membership. A null in the list also matches an absent field,
/// mirroring the null-literal equality rule.
fn eval_in(resolved: &Resolved<'_>, list: &[Bson]) -> bool {
    match resolved {
        Resolved::Missing => list.iter().any(|t| matches!(t, Bson::Null)),
        _ => candidates(resolved)
            .iter()
            .any(|v| list.iter().any(|t| values_equal(v, t))),
    }
}

/// Equality with the array-contains rule: a sequence matches a
/// non-sequence literal when any element equals it. A null literal also
/// matches an absent field.
fn eval_eq(resolved: &Resolved<'_>, target: &Bson) -> bool {
    if let Resolved::Missing = resolved {
        return matches!(target, Bson::Null);
    }
    candidates(resolved).iter().any(|v| values_equal(v, target))
}

/// Values an equality or ordered operator is tested against: the
/// resolved value itself plus, for a sequence, each of its elements.
fn candidates<'a>(resolved: &Resolved<'a>) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for value in resolved.values() {
        out.push(value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

/// The sequence an array operator (`$size`, `$all`, `$elemMatch`)
/// applies to: a resolved array's elements, or the fan-out list itself.
fn elements<'a>(resolved: &Resolved<'a>) -> Option<Vec<&'a Bson>> {
    match resolved {
        Resolved::One(Bson::Array(items)) => Some(items.iter().collect()),
        Resolved::Spread(values) => Some(values.clone()),
        _ => None,
    }
}

fn ordered_matches(op: CmpOp, value: &Bson, target: &Bson) -> bool {
    let Some(ordering) = compare_ordered(value, target) else {
        return false;
    };
    match op {
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Gte => ordering.is_ge(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Lte => ordering.is_le(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled by eval_eq"),
    }
}

fn matches_type(value: &Bson, t: TypeName) -> bool {
    match t {
        TypeName::String => matches!(value, Bson::String(_)),
        TypeName::Number => is_number(value),
        TypeName::Boolean => matches!(value, Bson::Boolean(_)),
        TypeName::Null => matches!(value, Bson::Null),
        TypeName::Array => matches!(value, Bson::Array(_)),
        TypeName::Date => matches!(value, Bson::DateTime(_)),
        TypeName::ObjectId => matches!(value, Bson::ObjectId(_)),
        TypeName::Object => matches!(value, Bson::Document(_)),
    }
}

//! Application of a parsed [`Update`] to a document tree.
//!
//! All operations are pure: the input document is cloned and the clone
//! mutated in place. Persistence and modified-count accounting belong
//! to the write coordinator.

use std::fmt;

use bson::{Bson, Document};

use crate::compare::{compare_ordered, sort_order, values_equal};
use crate::eval::element_matches;
use crate::path::resolve;
use crate::value::{as_f64, as_i64, is_number};

use super::{PopEnd, PullSpec, PushSort, PushSpec, Update};

/// An operator hit a value it cannot transform (e.g. `$inc` on a
/// string, `$push` on a non-array).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateApplyError(pub String);

impl fmt::Display for UpdateApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update apply error: {}", self.0)
    }
}

impl std::error::Error for UpdateApplyError {}

impl Update {
    /// Apply this update to `doc`, producing the new document.
    /// `$setOnInsert` entries are ignored.
    pub fn apply(&self, doc: &Document) -> Result<Document, UpdateApplyError> {
        self.apply_inner(doc, false)
    }

    /// Apply this update to a synthesized upsert document, including
    /// `$setOnInsert` entries.
    pub fn apply_for_insert(&self, doc: &Document) -> Result<Document, UpdateApplyError> {
        self.apply_inner(doc, true)
    }

    fn apply_inner(&self, doc: &Document, for_insert: bool) -> Result<Document, UpdateApplyError> {
        let mut out = doc.clone();

        for (path, value) in &self.set {
            set_path(&mut out, path, value.clone());
        }
        for path in &self.unset {
            unset_path(&mut out, path);
        }
        for (path, amount) in &self.inc {
            apply_arith(&mut out, path, amount, "$inc", add_numbers)?;
        }
        for (path, factor) in &self.mul {
            apply_arith(&mut out, path, factor, "$mul", mul_numbers)?;
        }
        for (path, value) in &self.min {
            apply_min_max(&mut out, path, value, true);
        }
        for (path, value) in &self.max {
            apply_min_max(&mut out, path, value, false);
        }
        for (from, to) in &self.rename {
            apply_rename(&mut out, from, to);
        }
        for (path, spec) in &self.push {
            apply_push(&mut out, path, spec)?;
        }
        for (path, spec) in &self.pull {
            apply_pull(&mut out, path, spec);
        }
        for (path, values) in &self.pull_all {
            apply_pull(&mut out, path, &PullAllSpec(values));
        }
        for (path, end) in &self.pop {
            apply_pop(&mut out, path, *end);
        }
        for (path, values) in &self.add_to_set {
            apply_add_to_set(&mut out, path, values)?;
        }
        if for_insert {
            for (path, value) in &self.set_on_insert {
                set_path(&mut out, path, value.clone());
            }
        }

        Ok(out)
    }
}

// ── Mutable path access ─────────────────────────────────────────

/// Terminal slot a mutation writes into: a document field or an array
/// element.
enum Place<'a> {
    Field(&'a mut Document, String),
    Element(&'a mut Vec<Bson>, usize),
}

impl Place<'_> {
    fn get(&self) -> Option<&Bson> {
        match self {
            Place::Field(doc, leaf) => doc.get(leaf),
            Place::Element(items, index) => items.get(*index),
        }
    }

    fn set(self, value: Bson) {
        match self {
            Place::Field(doc, leaf) => {
                doc.insert(leaf, value);
            }
            Place::Element(items, index) => {
                if index >= items.len() {
                    items.resize(index + 1, Bson::Null);
                }
                items[index] = value;
            }
        }
    }

    /// Remove the slot's value. Array elements are nulled rather than
    /// shifted so sibling positions stay stable.
    fn remove(self) -> Option<Bson> {
        match self {
            Place::Field(doc, leaf) => doc.remove(&leaf),
            Place::Element(items, index) => {
                let slot = items.get_mut(index)?;
                Some(std::mem::replace(slot, Bson::Null))
            }
        }
    }
}

/// Walk `path` to its terminal slot. With `create`, missing or
/// non-container intermediates become empty documents.
fn locate<'a>(doc: &'a mut Document, path: &str, create: bool) -> Option<Place<'a>> {
    let segments: Vec<&str> = path.split('.').collect();
    locate_in_doc(doc, &segments, create)
}

fn locate_in_doc<'a>(
    doc: &'a mut Document,
    segments: &[&str],
    create: bool,
) -> Option<Place<'a>> {
    let (head, rest) = segments.split_first()?;
    if rest.is_empty() {
        return Some(Place::Field(doc, head.to_string()));
    }
    let descendable = matches!(doc.get(*head), Some(Bson::Document(_)) | Some(Bson::Array(_)));
    if !descendable {
        if !create {
            return None;
        }
        doc.insert(head.to_string(), Bson::Document(Document::new()));
    }
    locate_in_value(doc.get_mut(*head)?, rest, create)
}

fn locate_in_value<'a>(
    value: &'a mut Bson,
    segments: &[&str],
    create: bool,
) -> Option<Place<'a>> {
    match value {
        Bson::Document(doc) => locate_in_doc(doc, segments, create),
        Bson::Array(items) => {
            let (head, rest) = segments.split_first()?;
            let index: usize = head.parse().ok()?;
            if rest.is_empty() {
                if index >= items.len() && !create {
                    return None;
                }
                return Some(Place::Element(items, index));
            }
            let descendable = matches!(
                items.get(index),
                Some(Bson::Document(_)) | Some(Bson::Array(_))
            );
            if !descendable {
                if !create || index >= items.len() {
                    return None;
                }
                items[index] = Bson::Document(Document::new());
            }
            locate_in_value(items.get_mut(index)?, rest, create)
        }
        _ => None,
    }
}

/// Write `value` at `path`, creating intermediate documents.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) {
    if let Some(place) = locate(doc, path, true) {
        place.set(value);
    }
}

/// Remove the terminal field at `path`; a no-op past any missing
/// intermediate.
pub(crate) fn unset_path(doc: &mut Document, path: &str) {
    if let Some(place) = locate(doc, path, false) {
        place.remove();
    }
}

// ── Operator application ────────────────────────────────────────

fn apply_arith(
    doc: &mut Document,
    path: &str,
    operand: &Bson,
    op: &str,
    combine: fn(&Bson, &Bson) -> Bson,
) -> Result<(), UpdateApplyError> {
    let place = match locate(doc, path, true) {
        Some(place) => place,
        None => return Ok(()),
    };
    let current = match place.get() {
        None | Some(Bson::Null) => zero_like(operand),
        Some(v) if is_number(v) => v.clone(),
        Some(other) => {
            return Err(UpdateApplyError(format!(
                "{op} target '{path}' holds non-numeric {}",
                crate::value::type_name(other)
            )));
        }
    };
    place.set(combine(&current, operand));
    Ok(())
}

fn zero_like(operand: &Bson) -> Bson {
    match operand {
        Bson::Double(_) => Bson::Double(0.0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Int32(0),
    }
}

fn add_numbers(a: &Bson, b: &Bson) -> Bson {
    combine_numbers(a, b, |x, y| x.checked_add(y), |x, y| x + y)
}

fn mul_numbers(a: &Bson, b: &Bson) -> Bson {
    combine_numbers(a, b, |x, y| x.checked_mul(y), |x, y| x * y)
}

/// Number-kind promotion: integer pairs stay integral (widening to
/// Int64 past i32, falling back to doubles on overflow); any double
/// operand makes the result a double.
fn combine_numbers(
    a: &Bson,
    b: &Bson,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Bson {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        if let Some(result) = int_op(x, y) {
            let narrow = matches!(a, Bson::Int32(_)) && matches!(b, Bson::Int32(_));
            if narrow {
                if let Ok(n) = i32::try_from(result) {
                    return Bson::Int32(n);
                }
            }
            return Bson::Int64(result);
        }
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => Bson::Double(float_op(x, y)),
        _ => a.clone(),
    }
}

fn apply_min_max(doc: &mut Document, path: &str, operand: &Bson, is_min: bool) {
    let place = match locate(doc, path, true) {
        Some(place) => place,
        None => return,
    };
    let replace = match place.get() {
        None => true,
        Some(current) => match compare_ordered(operand, current) {
            Some(ordering) => {
                if is_min {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                }
            }
            // Incomparable kinds: leave the field alone.
            None => false,
        },
    };
    if replace {
        place.set(operand.clone());
    }
}

fn apply_rename(doc: &mut Document, from: &str, to: &str) {
    let value = match locate(doc, from, false) {
        Some(place) => match place.remove() {
            Some(v) => v,
            None => return,
        },
        None => return,
    };
    set_path(doc, to, value);
}

fn apply_push(doc: &mut Document, path: &str, spec: &PushSpec) -> Result<(), UpdateApplyError> {
    let place = match locate(doc, path, true) {
        Some(place) => place,
        None => return Ok(()),
    };
    let mut items = match place.get() {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(other) => {
            return Err(UpdateApplyError(format!(
                "$push target '{path}' holds non-array {}",
                crate::value::type_name(other)
            )));
        }
    };

    let at = match spec.position {
        None => items.len(),
        Some(p) if p < 0 => items.len().saturating_sub(p.unsigned_abs() as usize),
        Some(p) => (p as usize).min(items.len()),
    };
    items.splice(at..at, spec.each.iter().cloned());

    if let Some(sort) = &spec.sort {
        sort_elements(&mut items, sort);
    }

    if let Some(n) = spec.slice {
        if n >= 0 {
            items.truncate(n as usize);
        } else {
            let keep = n.unsigned_abs() as usize;
            if items.len() > keep {
                items.drain(..items.len() - keep);
            }
        }
    }

    place.set(Bson::Array(items));
    Ok(())
}

fn sort_elements(items: &mut [Bson], sort: &PushSort) {
    match sort {
        PushSort::ByValue(direction) => {
            items.sort_by(|a, b| direction.apply(sort_order(Some(a), Some(b))));
        }
        PushSort::ByFields(keys) => {
            items.sort_by(|a, b| {
                for (field, direction) in keys {
                    let va = field_of(a, field);
                    let vb = field_of(b, field);
                    let ordering = direction.apply(sort_order(va, vb));
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
    }
}

fn field_of<'a>(value: &'a Bson, field: &str) -> Option<&'a Bson> {
    match value {
        Bson::Document(doc) => resolve(doc, field).single(),
        _ => None,
    }
}

/// `$pull` and `$pullAll` share the retain loop; `$pullAll` is a
/// multi-literal pull.
trait PullPredicate {
    fn removes(&self, element: &Bson) -> bool;
}

impl PullPredicate for PullSpec {
    fn removes(&self, element: &Bson) -> bool {
        match self {
            PullSpec::Equals(value) => values_equal(element, value),
            PullSpec::Matching(predicate) => element_matches(element, predicate),
        }
    }
}

struct PullAllSpec<'a>(&'a [Bson]);

impl PullPredicate for PullAllSpec<'_> {
    fn removes(&self, element: &Bson) -> bool {
        self.0.iter().any(|v| values_equal(element, v))
    }
}

fn apply_pull(doc: &mut Document, path: &str, spec: &impl PullPredicate) {
    let place = match locate(doc, path, false) {
        Some(place) => place,
        None => return,
    };
    let mut items = match place.get() {
        Some(Bson::Array(items)) => items.clone(),
        _ => return,
    };
    items.retain(|element| !spec.removes(element));
    place.set(Bson::Array(items));
}

fn apply_pop(doc: &mut Document, path: &str, end: PopEnd) {
    let place = match locate(doc, path, false) {
        Some(place) => place,
        None => return,
    };
    let mut items = match place.get() {
        Some(Bson::Array(items)) if !items.is_empty() => items.clone(),
        _ => return,
    };
    match end {
        PopEnd::First => {
            items.remove(0);
        }
        PopEnd::Last => {
            items.pop();
        }
    }
    place.set(Bson::Array(items));
}

fn apply_add_to_set(
    doc: &mut Document,
    path: &str,
    values: &[Bson],
) -> Result<(), UpdateApplyError> {
    let place = match locate(doc, path, true) {
        Some(place) => place,
        None => return Ok(()),
    };
    let mut items = match place.get() {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items.clone(),
        Some(other) => {
            return Err(UpdateApplyError(format!(
                "$addToSet target '{path}' holds non-array {}",
                crate::value::type_name(other)
            )));
        }
    };
    for value in values {
        if !items.iter().any(|existing| values_equal(existing, value)) {
            items.push(value.clone());
        }
    }
    place.set(Bson::Array(items));
    Ok(())
}

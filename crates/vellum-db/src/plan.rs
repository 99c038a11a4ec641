//! Query planning: decide whether a filter can be served by the
//! primary key, a declared index, or only a full collection scan.
//!
//! Selection order: `_id` point lookups win outright, then the first
//! declared index whose field list the filter consumes, then the scan.
//! Whatever the plan, the executor re-verifies every candidate against
//! the full filter, so planning is purely an access-path choice.

use bson::oid::ObjectId;
use bson::Bson;
use vellum_query::{CmpOp, Condition, Filter};

use crate::catalog::Catalog;
use crate::index::IndexDefinition;
use crate::sortable;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    /// Direct primary-key lookups, no scan.
    IdLookup(Vec<ObjectId>),
    /// Exact-match prefix scans on one indexed field (several for `$in`).
    IndexExact { field: String, values: Vec<Vec<u8>> },
    /// Ordered range scan between encoded bounds on one indexed field.
    IndexRange {
        field: String,
        lower: Option<(Vec<u8>, bool)>,
        upper: Option<(Vec<u8>, bool)>,
    },
    FullScan,
}

impl Plan {
    pub fn kind(&self) -> &'static str {
        match self {
            Plan::IdLookup(_) => "id_lookup",
            Plan::IndexExact { .. } => "index_exact",
            Plan::IndexRange { .. } => "index_range",
            Plan::FullScan => "full_scan",
        }
    }
}

/// Pick an access path for `filter` given the declared indexes.
pub(crate) fn plan_query(filter: &Filter, catalog: &Catalog) -> Plan {
    let fields = top_level_fields(filter);

    if let Some(ids) = id_lookup(&fields) {
        return Plan::IdLookup(ids);
    }

    for def in catalog.indexes() {
        if let Some(plan) = try_index(def, &fields, catalog) {
            return plan;
        }
    }

    Plan::FullScan
}

/// The id an upsert should synthesize its document under: an `_id`
/// equality in the filter, if any.
pub(crate) fn upsert_id(filter: &Filter) -> Option<ObjectId> {
    let fields = top_level_fields(filter);
    let (_, conditions) = fields.iter().find(|(path, _)| *path == "_id")?;
    conditions.iter().find_map(|condition| match condition {
        Condition::Cmp(CmpOp::Eq, Bson::ObjectId(oid)) => Some(*oid),
        _ => None,
    })
}

/// The field predicates visible at the top level: direct field entries
/// and field entries of a top-level `$and`.
fn top_level_fields(filter: &Filter) -> Vec<(&str, &[Condition])> {
    match filter {
        Filter::Field { path, conditions } => vec![(path.as_str(), conditions.as_slice())],
        Filter::And(children) => children
            .iter()
            .filter_map(|child| match child {
                Filter::Field { path, conditions } => {
                    Some((path.as_str(), conditions.as_slice()))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn id_lookup(fields: &[(&str, &[Condition])]) -> Option<Vec<ObjectId>> {
    let (_, conditions) = fields.iter().find(|(path, _)| *path == "_id")?;
    for condition in *conditions {
        match condition {
            Condition::Cmp(CmpOp::Eq, Bson::ObjectId(oid)) => return Some(vec![*oid]),
            Condition::In(list) => {
                let ids: Vec<ObjectId> = list
                    .iter()
                    .filter_map(|v| match v {
                        Bson::ObjectId(oid) => Some(*oid),
                        _ => None,
                    })
                    .collect();
                if ids.len() == list.len() {
                    return Some(ids);
                }
            }
            _ => {}
        }
    }
    None
}

fn try_index(
    def: &IndexDefinition,
    fields: &[(&str, &[Condition])],
    catalog: &Catalog,
) -> Option<Plan> {
    let leading = def.spec.leading_field();
    let (_, conditions) = fields.iter().find(|(path, _)| *path == leading)?;

    if def.spec.fields.len() > 1 {
        // Compound: every trailing field must appear in the filter; the
        // scan itself narrows only by the leading field's exact values.
        let trailing_present = def.spec.fields[1..]
            .iter()
            .all(|f| fields.iter().any(|(path, _)| *path == f.path));
        if !trailing_present {
            return None;
        }
        let values = exact_values(conditions, catalog.field_is_sparse(leading))?;
        return Some(Plan::IndexExact {
            field: leading.to_string(),
            values,
        });
    }

    if let Some(values) = exact_values(conditions, catalog.field_is_sparse(leading)) {
        return Some(Plan::IndexExact {
            field: leading.to_string(),
            values,
        });
    }
    range_bounds(conditions).map(|(lower, upper)| Plan::IndexRange {
        field: leading.to_string(),
        lower,
        upper,
    })
}

/// Serialized exact-match values from a `$eq` (or literal) or `$in`
/// predicate. `None` when no such predicate exists or an operand cannot
/// be located through the index (array literals fan out in storage; a
/// null probe needs sentinel entries, which a sparse field lacks).
fn exact_values(conditions: &[Condition], field_sparse: bool) -> Option<Vec<Vec<u8>>> {
    for condition in conditions {
        match condition {
            Condition::Cmp(CmpOp::Eq, value) if exact_locatable(value, field_sparse) => {
                return Some(vec![sortable::encode(value)]);
            }
            Condition::In(list)
                if !list.is_empty()
                    && list.iter().all(|v| exact_locatable(v, field_sparse)) =>
            {
                return Some(list.iter().map(sortable::encode).collect());
            }
            _ => {}
        }
    }
    None
}

fn exact_locatable(value: &Bson, field_sparse: bool) -> bool {
    match value {
        // A stored array contributes element entries, never a
        // whole-array entry.
        Bson::Array(_) => false,
        // Null also matches missing fields; without sentinel entries
        // the index cannot see those.
        Bson::Null => !field_sparse,
        _ => true,
    }
}

/// Range bounds from `$gt`/`$gte`/`$lt`/`$lte` predicates, first of
/// each side wins.
#[allow(clippy::type_complexity)]
fn range_bounds(
    conditions: &[Condition],
) -> Option<(Option<(Vec<u8>, bool)>, Option<(Vec<u8>, bool)>)> {
    let mut lower = None;
    let mut upper = None;
    for condition in conditions {
        match condition {
            Condition::Cmp(CmpOp::Gt, v) if lower.is_none() && rangeable(v) => {
                lower = Some((sortable::encode(v), false));
            }
            Condition::Cmp(CmpOp::Gte, v) if lower.is_none() && rangeable(v) => {
                lower = Some((sortable::encode(v), true));
            }
            Condition::Cmp(CmpOp::Lt, v) if upper.is_none() && rangeable(v) => {
                upper = Some((sortable::encode(v), false));
            }
            Condition::Cmp(CmpOp::Lte, v) if upper.is_none() && rangeable(v) => {
                upper = Some((sortable::encode(v), true));
            }
            _ => {}
        }
    }
    if lower.is_none() && upper.is_none() {
        None
    } else {
        Some((lower, upper))
    }
}

/// Kinds whose sortable encoding orders the same way the comparator
/// does, making a native range scan sound.
fn rangeable(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_)
            | Bson::Int64(_)
            | Bson::Double(_)
            | Bson::String(_)
            | Bson::DateTime(_)
            | Bson::ObjectId(_)
            | Bson::Boolean(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexOptions, IndexSpec};
    use bson::doc;
    use vellum_query::parse_filter;

    fn catalog_with(keys: &[bson::Document]) -> Catalog {
        let mut catalog = Catalog::default();
        for k in keys {
            catalog.add(IndexDefinition::new(
                IndexSpec::parse(k).unwrap(),
                IndexOptions::default(),
            ));
        }
        catalog
    }

    fn plan(filter: bson::Document, catalog: &Catalog) -> Plan {
        plan_query(&parse_filter(&filter).unwrap(), catalog)
    }

    #[test]
    fn id_equality_wins_over_indexes() {
        let catalog = catalog_with(&[doc! { "age": 1 }]);
        let oid = ObjectId::new();
        let p = plan(doc! { "_id": oid, "age": 30 }, &catalog);
        assert_eq!(p, Plan::IdLookup(vec![oid]));
    }

    #[test]
    fn id_in_list_becomes_multi_lookup() {
        let catalog = Catalog::default();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let p = plan(doc! { "_id": { "$in": [a, b] } }, &catalog);
        assert_eq!(p, Plan::IdLookup(vec![a, b]));
    }

    #[test]
    fn eq_on_indexed_field_is_exact_scan() {
        let catalog = catalog_with(&[doc! { "age": 1 }]);
        let p = plan(doc! { "age": 30 }, &catalog);
        match p {
            Plan::IndexExact { field, values } => {
                assert_eq!(field, "age");
                assert_eq!(values, vec![sortable::encode(&Bson::Int32(30))]);
            }
            other => panic!("expected IndexExact, got {other:?}"),
        }
    }

    #[test]
    fn in_on_indexed_field_is_multi_exact_scan() {
        let catalog = catalog_with(&[doc! { "status": 1 }]);
        let p = plan(doc! { "status": { "$in": ["a", "b"] } }, &catalog);
        match p {
            Plan::IndexExact { values, .. } => assert_eq!(values.len(), 2),
            other => panic!("expected IndexExact, got {other:?}"),
        }
    }

    #[test]
    fn range_on_indexed_field() {
        let catalog = catalog_with(&[doc! { "age": 1 }]);
        let p = plan(doc! { "age": { "$gte": 25, "$lt": 40 } }, &catalog);
        match p {
            Plan::IndexRange { field, lower, upper } => {
                assert_eq!(field, "age");
                assert_eq!(lower, Some((sortable::encode(&Bson::Int32(25)), true)));
                assert_eq!(upper, Some((sortable::encode(&Bson::Int32(40)), false)));
            }
            other => panic!("expected IndexRange, got {other:?}"),
        }
    }

    #[test]
    fn unindexed_filter_falls_back_to_scan() {
        let catalog = catalog_with(&[doc! { "age": 1 }]);
        assert_eq!(plan(doc! { "name": "A" }, &catalog), Plan::FullScan);
        assert_eq!(plan(doc! {}, &catalog), Plan::FullScan);
    }

    #[test]
    fn first_declared_index_wins() {
        let catalog = catalog_with(&[doc! { "a": 1 }, doc! { "b": 1 }]);
        let p = plan(doc! { "b": 2, "a": 1 }, &catalog);
        match p {
            Plan::IndexExact { field, .. } => assert_eq!(field, "a"),
            other => panic!("expected IndexExact, got {other:?}"),
        }
    }

    #[test]
    fn compound_needs_leading_exact_and_trailing_present() {
        let catalog = catalog_with(&[doc! { "c": 1, "p": 1 }]);
        let p = plan(doc! { "c": "work", "p": "high" }, &catalog);
        match p {
            Plan::IndexExact { field, .. } => assert_eq!(field, "c"),
            other => panic!("expected IndexExact, got {other:?}"),
        }
        // Trailing field absent: unusable.
        assert_eq!(plan(doc! { "c": "work" }, &catalog), Plan::FullScan);
        // Leading field only has a range predicate: unusable.
        assert_eq!(
            plan(doc! { "c": { "$gt": "a" }, "p": "high" }, &catalog),
            Plan::FullScan
        );
    }

    #[test]
    fn array_literal_equality_is_not_index_locatable() {
        let catalog = catalog_with(&[doc! { "tags": 1 }]);
        assert_eq!(plan(doc! { "tags": ["x", "y"] }, &catalog), Plan::FullScan);
        // A scalar probe into a multi-key field is fine.
        assert!(matches!(
            plan(doc! { "tags": "x" }, &catalog),
            Plan::IndexExact { .. }
        ));
    }

    #[test]
    fn null_probe_skips_sparse_index() {
        let mut catalog = Catalog::default();
        catalog.add(IndexDefinition::new(
            IndexSpec::parse(&doc! { "email": 1 }).unwrap(),
            IndexOptions {
                sparse: true,
                ..Default::default()
            },
        ));
        assert_eq!(plan(doc! { "email": Bson::Null }, &catalog), Plan::FullScan);

        let dense = catalog_with(&[doc! { "email": 1 }]);
        assert!(matches!(
            plan(doc! { "email": Bson::Null }, &dense),
            Plan::IndexExact { .. }
        ));
    }

    #[test]
    fn or_at_top_level_scans() {
        let catalog = catalog_with(&[doc! { "age": 1 }]);
        assert_eq!(
            plan(doc! { "$or": [{ "age": 1 }, { "name": "A" }] }, &catalog),
            Plan::FullScan
        );
    }
}

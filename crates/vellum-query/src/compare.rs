//! The single value comparator shared by the filter evaluator, the
//! update engine, and the executor's sort. Equality and ordering are
//! separate entry points over one kind dispatch.

use std::cmp::Ordering;

use bson::Bson;

use crate::value::{as_f64, as_i64, is_number};

/// Structural equality. The three number kinds are unified; arrays are
/// equal element-wise in order; documents are equal by key set (field
/// order carries no meaning).
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        _ if is_number(a) && is_number(b) => numeric_cmp(a, b) == Some(Ordering::Equal),
        (Bson::Null, Bson::Null) => true,
        (Bson::Boolean(x), Bson::Boolean(y)) => x == y,
        (Bson::String(x), Bson::String(y)) => x == y,
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis() == y.timestamp_millis()
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes() == y.bytes(),
        (Bson::Binary(x), Bson::Binary(y)) => x == y,
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => false,
    }
}

/// Whole-document structural equality, key-set based like the
/// document arm of [`values_equal`].
pub fn documents_equal(a: &bson::Document, b: &bson::Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
}

/// Ordered comparison, total only within a comparable kind set:
/// numbers, strings, timestamps, object-ids, booleans. `None` across
/// kinds — ordered filter operators then simply do not match.
pub fn compare_ordered(a: &Bson, b: &Bson) -> Option<Ordering> {
    if is_number(a) && is_number(b) {
        return numeric_cmp(a, b);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn numeric_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    // Integer pairs compare exactly; anything involving a double goes
    // through f64.
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return Some(x.cmp(&y));
    }
    let (x, y) = (as_f64(a)?, as_f64(b)?);
    x.partial_cmp(&y)
}

/// Rank of a value kind in the total sort order. Missing and null sort
/// first ascending; the remaining brackets follow the BSON comparison
/// order.
fn kind_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(v) if is_number(v) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(_) => 9,
    }
}

/// Total order used for sorting result sets. Never returns "cannot
/// compare": cross-kind pairs order by kind rank, within-kind pairs by
/// [`compare_ordered`] with structural fallbacks for documents, arrays
/// and binary.
pub fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let rank = kind_rank(a).cmp(&kind_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        // Both missing/null bracket.
        _ => return Ordering::Equal,
    };
    if let Some(ord) = compare_ordered(a, b) {
        return ord;
    }
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            for (u, v) in x.iter().zip(y.iter()) {
                let ord = sort_order(Some(u), Some(v));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                let ord = ka.cmp(kb).then_with(|| sort_order(Some(va), Some(vb)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Bson};

    #[test]
    fn numbers_unify_across_kinds() {
        assert!(values_equal(&Bson::Int32(2), &Bson::Int64(2)));
        assert!(values_equal(&Bson::Int64(2), &Bson::Double(2.0)));
        assert!(!values_equal(&Bson::Int64(2), &Bson::Double(2.5)));
        assert_eq!(
            compare_ordered(&Bson::Int32(2), &Bson::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn large_integers_compare_exactly() {
        let a = Bson::Int64(i64::MAX);
        let b = Bson::Int64(i64::MAX - 1);
        assert_eq!(compare_ordered(&a, &b), Some(Ordering::Greater));
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn cross_kind_ordering_is_undefined() {
        assert_eq!(
            compare_ordered(&Bson::String("5".into()), &Bson::Int32(5)),
            None
        );
        assert_eq!(compare_ordered(&Bson::Null, &Bson::Int32(0)), None);
        assert_eq!(
            compare_ordered(&Bson::Boolean(true), &Bson::Int32(1)),
            None
        );
    }

    #[test]
    fn array_equality_is_ordered() {
        let a = Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]);
        let b = Bson::Array(vec![Bson::Int32(2), Bson::Int32(1)]);
        let c = Bson::Array(vec![Bson::Int64(1), Bson::Double(2.0)]);
        assert!(!values_equal(&a, &b));
        assert!(values_equal(&a, &c));
    }

    #[test]
    fn document_equality_ignores_field_order() {
        let a = Bson::Document(doc! { "x": 1, "y": 2 });
        let b = Bson::Document(doc! { "y": 2, "x": 1 });
        assert!(values_equal(&a, &b));
    }

    #[test]
    fn document_equality_requires_same_key_set() {
        let a = Bson::Document(doc! { "x": 1 });
        let b = Bson::Document(doc! { "x": 1, "y": 2 });
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn timestamps_compare_by_millis() {
        let a = Bson::DateTime(bson::DateTime::from_millis(1_000));
        let b = Bson::DateTime(bson::DateTime::from_millis(2_000));
        assert_eq!(compare_ordered(&a, &b), Some(Ordering::Less));
        assert!(values_equal(&a, &a.clone()));
    }

    #[test]
    fn sort_order_puts_missing_and_null_first() {
        let v = Bson::Int32(0);
        assert_eq!(sort_order(None, Some(&v)), Ordering::Less);
        assert_eq!(sort_order(Some(&Bson::Null), Some(&v)), Ordering::Less);
        assert_eq!(sort_order(None, Some(&Bson::Null)), Ordering::Equal);
    }

    #[test]
    fn sort_order_is_total_across_kinds() {
        let number = Bson::Int32(5);
        let string = Bson::String("a".into());
        let boolean = Bson::Boolean(false);
        assert_eq!(sort_order(Some(&number), Some(&string)), Ordering::Less);
        assert_eq!(sort_order(Some(&string), Some(&boolean)), Ordering::Less);
    }
}

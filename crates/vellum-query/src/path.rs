//! Dotted-path resolution against a document tree.
//!
//! Resolution distinguishes three outcomes: a single value, a fan-out
//! over array elements (the implicit array projection), and absent.
//! Absent is not null — conflating the two is how `$exists` and sparse
//! indexes break.

use bson::{Bson, Document};

/// Outcome of resolving a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    One(&'a Bson),
    /// A non-numeric step traversed an array of documents and collected
    /// one value per matching element.
    Spread(Vec<&'a Bson>),
    Missing,
}

impl<'a> Resolved<'a> {
    pub fn exists(&self) -> bool {
        !matches!(self, Resolved::Missing)
    }

    /// The single resolved value, if exactly one.
    pub fn single(&self) -> Option<&'a Bson> {
        match self {
            Resolved::One(v) => Some(v),
            _ => None,
        }
    }

    /// Every resolved value: one, the fan-out list, or none.
    pub fn values(&self) -> Vec<&'a Bson> {
        match self {
            Resolved::One(v) => vec![v],
            Resolved::Spread(vs) => vs.clone(),
            Resolved::Missing => vec![],
        }
    }
}

/// Resolve `path` against `doc`.
pub fn resolve<'a>(doc: &'a Document, path: &str) -> Resolved<'a> {
    let mut state = State::Doc(doc);
    for segment in path.split('.') {
        state = match step(state, segment) {
            Some(next) => next,
            None => return Resolved::Missing,
        };
    }
    match state {
        State::Doc(_) => Resolved::Missing, // path was empty
        State::Single(v) => Resolved::One(v),
        State::Multi(vs) => Resolved::Spread(vs),
    }
}

enum State<'a> {
    /// Root document, before the first step.
    Doc(&'a Document),
    Single(&'a Bson),
    Multi(Vec<&'a Bson>),
}

fn step<'a>(state: State<'a>, segment: &str) -> Option<State<'a>> {
    match state {
        State::Doc(doc) => doc.get(segment).map(State::Single),
        State::Single(Bson::Document(doc)) => doc.get(segment).map(State::Single),
        State::Single(value @ Bson::Array(items)) => {
            if segment.is_empty() || segment == "$" {
                // Address the array container itself.
                return Some(State::Single(value));
            }
            step_sequence(items.iter().collect(), segment)
        }
        State::Multi(values) => {
            if segment.is_empty() || segment == "$" {
                return Some(State::Multi(values));
            }
            step_sequence(values, segment)
        }
        State::Single(_) => None,
    }
}

/// Apply one step against a sequence of values: numeric → positional,
/// non-numeric → fan out over document elements.
fn step_sequence<'a>(values: Vec<&'a Bson>, segment: &str) -> Option<State<'a>> {
    if let Ok(index) = segment.parse::<usize>() {
        return values.get(index).copied().map(State::Single);
    }
    let collected: Vec<&Bson> = values
        .iter()
        .filter_map(|v| match v {
            Bson::Document(doc) => doc.get(segment),
            _ => None,
        })
        .collect();
    if collected.is_empty() {
        None
    } else {
        Some(State::Multi(collected))
    }
}

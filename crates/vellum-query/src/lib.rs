//! Declarative document semantics: path resolution, value comparison,
//! filter matching, update application, sorting, and projection. Pure
//! of any storage concern — the engine crate drives these against
//! streamed documents.

pub mod compare;
mod eval;
mod filter;
pub mod path;
mod projection;
mod sort;
mod update;
pub mod value;

pub use compare::{compare_ordered, documents_equal, sort_order, values_equal};
pub use eval::{element_matches, matches};
pub use filter::{
    parse_filter, CmpOp, Condition, ElementPredicate, Filter, FilterParseError, TypeName,
};
pub use path::{resolve, Resolved};
pub use projection::{parse_projection, Projection, ProjectionParseError};
pub use sort::{compare_documents, parse_sort, Direction, SortKey, SortParseError};
pub use update::{
    parse_update, PopEnd, PullSpec, PushSort, PushSpec, Update, UpdateApplyError,
    UpdateParseError,
};
pub use value::{validate_document, validate_value, ValueError};

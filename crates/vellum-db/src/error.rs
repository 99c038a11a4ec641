use std::fmt;

use vellum_kv::KvError;
use vellum_query::{
    FilterParseError, ProjectionParseError, SortParseError, UpdateApplyError, UpdateParseError,
    ValueError,
};

#[derive(Debug)]
pub enum DbError {
    /// Malformed document, filter, update, projection, or index
    /// definition.
    InvalidInput(String),
    /// Primary-key or unique-index violation; carries the offending
    /// field name.
    DuplicateKey(String),
    /// An atomic batch failed its version check. Read-then-retry at the
    /// caller's discretion.
    ConcurrentModification,
    Kv(KvError),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            DbError::DuplicateKey(field) => write!(f, "duplicate key: {field}"),
            DbError::ConcurrentModification => write!(f, "concurrent modification"),
            DbError::Kv(e) => write!(f, "kv error: {e}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<KvError> for DbError {
    fn from(e: KvError) -> Self {
        DbError::Kv(e)
    }
}

impl From<FilterParseError> for DbError {
    fn from(e: FilterParseError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

impl From<UpdateParseError> for DbError {
    fn from(e: UpdateParseError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

impl From<UpdateApplyError> for DbError {
    fn from(e: UpdateApplyError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

impl From<SortParseError> for DbError {
    fn from(e: SortParseError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

impl From<ProjectionParseError> for DbError {
    fn from(e: ProjectionParseError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

impl From<ValueError> for DbError {
    fn from(e: ValueError) -> Self {
        DbError::InvalidInput(e.to_string())
    }
}

/// Per-entry failure inside a multi-document operation, tagged with the
/// original input index.
#[derive(Debug)]
pub struct WriteError {
    pub index: usize,
    pub error: DbError,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write error at index {}: {}", self.index, self.error)
    }
}

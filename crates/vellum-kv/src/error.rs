use std::fmt;

#[derive(Debug)]
pub enum KvError {
    /// Backend failure (I/O, poisoned lock, backend-specific fault).
    Storage(String),
    /// A stored key or value failed to decode.
    Corrupt(String),
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::Storage(msg) => write!(f, "storage error: {msg}"),
            KvError::Corrupt(msg) => write!(f, "corrupt entry: {msg}"),
        }
    }
}

impl std::error::Error for KvError {}

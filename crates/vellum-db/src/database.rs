use std::sync::Arc;

use vellum_kv::Kv;

use crate::collection::Collection;
use crate::error::DbError;

/// Entry point: a shared KV handle from which collections are opened.
pub struct Database<K: Kv> {
    kv: Arc<K>,
}

impl<K: Kv> Database<K> {
    pub fn new(kv: K) -> Self {
        Database { kv: Arc::new(kv) }
    }

    /// Open a collection by name, loading its index catalog.
    pub fn collection(&self, name: &str) -> Result<Collection<K>, DbError> {
        Collection::open(Arc::clone(&self.kv), name)
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }
}

impl<K: Kv> Clone for Database<K> {
    fn clone(&self) -> Self {
        Database {
            kv: Arc::clone(&self.kv),
        }
    }
}

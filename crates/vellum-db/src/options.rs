use bson::Document;

/// Read options for `find`. Sort and projection stay as documents and
/// are parsed per call.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub projection: Option<Document>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub upsert: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct InsertManyOptions {
    /// Ordered mode halts at the first failure, keeping prior
    /// successes; unordered mode continues and collects every error.
    pub ordered: bool,
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        InsertManyOptions { ordered: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountOptions {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

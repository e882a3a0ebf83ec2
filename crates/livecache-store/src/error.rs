use livecache_types::ResourceId;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing medium cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No table is registered for the resource.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),

    /// A projection, filter, ordering, or value names a column the table
    /// does not have.
    #[error("unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// The request is structurally invalid for this store.
    #[error("malformed request: {0}")]
    MalformedQuery(String),

    /// A not-null, type, or unique constraint rejected a write.
    #[error("constraint violation on table {table}: {reason}")]
    ConstraintViolation { table: String, reason: String },

    /// A table schema failed validation.
    #[error("invalid schema for table {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    /// A table with the same name or resource is already registered.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// A persisted image was written by a different definition.
    #[error("store image belongs to {found}, expected {expected}")]
    DefinitionMismatch { expected: String, found: String },

    /// A persisted image is newer than the definition opening it.
    #[error("store image version {found} is newer than definition version {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the persistence layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// `true` when the failure is about the medium rather than the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }

    /// `true` when the request itself was at fault.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::UnknownResource(_) | Self::UnknownColumn { .. } | Self::MalformedQuery(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

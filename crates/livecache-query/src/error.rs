use livecache_store::StoreError;
use livecache_types::ParseError;

/// Why a load produced no snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// The store could not be reached. Retrying later may succeed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the query itself (unknown resource or column).
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// The row parser rejected a row.
    #[error("failed to parse row {row}: {source}")]
    ParseFailure {
        row: usize,
        #[source]
        source: ParseError,
    },

    /// The loader or row parser panicked.
    #[error("load panicked: {0}")]
    Panicked(String),

    /// The load was superseded or its cell was torn down.
    #[error("load canceled")]
    Canceled,
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::MalformedQuery(err.to_string())
        }
    }
}

/// Result alias for loads.
pub type LoadResult<T> = Result<T, LoadError>;

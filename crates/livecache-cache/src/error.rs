use livecache_types::QueryKey;

/// Errors from cache and subscription management.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The manager was shut down; no further subscriptions are accepted.
    #[error("subscription manager is shut down")]
    ShutDown,

    /// No tokio runtime was available to run loads and the change listener.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// No cell is cached for the key.
    #[error("no cached cell for {0}")]
    UnknownKey(QueryKey),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

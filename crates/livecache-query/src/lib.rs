//! Query execution for livecache.
//!
//! Turns a [`Query`](livecache_types::Query) into a [`Snapshot`] by running
//! it against a [`Store`](livecache_store::Store) and decoding each row with a
//! caller-supplied [`RowParser`].
//!
//! # Snapshot Modes
//!
//! - [`Snapshot::Materialized`] -- every row parsed up front
//! - [`Snapshot::Indexed`] -- rows parsed on first access, each at most once

pub mod error;
pub mod executor;
pub mod parser;
pub mod snapshot;

pub use error::{LoadError, LoadResult};
pub use executor::QueryExecutor;
pub use parser::{FromRow, FromRowParser, RowParser};
pub use snapshot::{IndexedRows, Snapshot};

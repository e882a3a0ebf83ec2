//! Record store contract and reference store for livecache.
//!
//! The observable cache treats the store as an external collaborator: it
//! reads rows through the [`Store`] trait and learns about mutations from
//! [`ChangeNotification`]s, never by polling.
//!
//! # Storage Backends
//!
//! All backends implement the [`Store`] trait:
//!
//! - [`InMemoryStore`] -- table-based store for tests, the demo host, and
//!   embedding, with optional JSON persistence through a versioned
//!   [`StoreDefinition`]
//!
//! # Design Rules
//!
//! 1. Requests are typed ([`Filter`](livecache_types::Filter),
//!    [`Values`](livecache_types::Values)); no query text is ever built.
//! 2. Every successful mutation emits exactly one notification, after the
//!    change is visible to readers.
//! 3. Failed mutations change nothing and notify nothing.
//! 4. Bulk inserts validate every row before applying any.
//! 5. Unique conflicts resolve per constraint: replace or abort.

pub mod definition;
pub mod error;
mod eval;
pub mod memory;
pub mod notify;
pub mod schema;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use definition::StoreDefinition;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use notify::{ChangeFilter, ChangeKind, ChangeNotification, ChangeRouter, ChangeStream};
pub use schema::{ColumnDef, ColumnType, ConflictPolicy, TableSchema, UniqueConstraint, ID_COLUMN};
pub use traits::{RecordId, Store};

use std::fmt;

use serde::{Deserialize, Serialize};

use livecache_types::{Filter, Order, Query, ResourceId, RowSet, Values};

use crate::error::StoreResult;
use crate::notify::{ChangeFilter, ChangeStream};

/// Row id assigned by a store on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authoritative, mutable record store.
///
/// All implementations must satisfy these invariants:
/// - Reads never mutate and never emit notifications.
/// - After every successful mutation, exactly one [`ChangeNotification`]
///   tagged with the addressed resource is broadcast, after the mutation is
///   visible to readers.
/// - A failed mutation leaves the store unchanged and emits nothing.
/// - Requests are typed; no query text is ever assembled.
///
/// [`ChangeNotification`]: crate::ChangeNotification
pub trait Store: Send + Sync {
    /// Run a read-only query.
    ///
    /// `projection` of `None` returns every column. Rows come back in
    /// insertion order unless `order` says otherwise.
    fn query(
        &self,
        resource: &ResourceId,
        projection: Option<&[String]>,
        filter: Option<&Filter>,
        order: &[Order],
    ) -> StoreResult<RowSet>;

    /// Insert one row. A conflict on a unique constraint resolves per the
    /// constraint's policy.
    fn insert(&self, resource: &ResourceId, values: &Values) -> StoreResult<RecordId>;

    /// Insert many rows as one atomic step: every row is validated before
    /// any is applied. Returns the number of rows written.
    fn bulk_insert(&self, resource: &ResourceId, rows: &[Values]) -> StoreResult<usize>;

    /// Apply `patch` to every row matching `filter`. Returns rows affected.
    fn update(&self, resource: &ResourceId, patch: &Values, filter: Option<&Filter>)
        -> StoreResult<usize>;

    /// Delete every row matching `filter`. Returns rows affected.
    fn delete(&self, resource: &ResourceId, filter: Option<&Filter>) -> StoreResult<usize>;

    /// Subscribe to change notifications selected by `filter`.
    fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeStream;

    /// Run a [`Query`].
    ///
    /// Default implementation unpacks the query into [`Store::query`].
    fn run(&self, query: &Query) -> StoreResult<RowSet> {
        self.query(
            &query.resource,
            query.projection.as_deref(),
            query.filter.as_ref(),
            &query.order,
        )
    }
}

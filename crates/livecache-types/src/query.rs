use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::filter::{Filter, Order};
use crate::resource::ResourceId;

/// How a query's result is materialized into a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotMode {
    /// Every row parsed up front into an ordered sequence of records.
    #[default]
    Materialized,
    /// Raw rows kept; each record parsed on first access.
    Indexed,
}

/// Canonical identity of a logical query.
///
/// Two queries that return the same logical result have equal keys; distinct
/// logical queries have distinct keys. Keys built from a [`Query`] come from
/// [`Query::key`]; free-form keys (for cells fed by direct posts rather than
/// store queries) come from [`QueryKey::parse`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if s.is_empty() {
            return Err(TypeError::EmptyKey);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({})", self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A query against one store resource.
///
/// ```
/// use livecache_types::{Filter, Order, Query, ResourceId};
///
/// let q = Query::new(ResourceId::new("content://files.demo/cloudfile"))
///     .project(["path", "name"])
///     .filter(Filter::starts_with("path", "/sdcard"))
///     .order_by(Order::asc("name"));
/// assert!(q.key().as_str().starts_with("content://files.demo/cloudfile?"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub resource: ResourceId,
    /// Columns to return, in order. `None` returns every column.
    pub projection: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub order: Vec<Order>,
    pub mode: SnapshotMode,
    /// Whether store change notifications re-run this query.
    pub refresh_on_change: bool,
}

impl Query {
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            projection: None,
            filter: None,
            order: Vec::new(),
            mode: SnapshotMode::Materialized,
            refresh_on_change: true,
        }
    }

    pub fn project<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append an ordering term; earlier terms take precedence.
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Produce an indexed (lazily parsed) snapshot instead of a materialized one.
    pub fn indexed(mut self) -> Self {
        self.mode = SnapshotMode::Indexed;
        self
    }

    /// Load once; ignore later store change notifications.
    pub fn static_result(mut self) -> Self {
        self.refresh_on_change = false;
        self
    }

    /// Canonical key: `resource?select=…&where=…&order=…&mode=…[&static]`.
    pub fn key(&self) -> QueryKey {
        let select = match &self.projection {
            Some(cols) => cols.join(","),
            None => "*".to_string(),
        };
        let filter = self
            .filter
            .as_ref()
            .map(|f| f.canonical().to_string())
            .unwrap_or_default();
        let order = self
            .order
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mode = match self.mode {
            SnapshotMode::Materialized => "materialized",
            SnapshotMode::Indexed => "indexed",
        };
        let mut key = format!(
            "{}?select={select}&where={filter}&order={order}&mode={mode}",
            self.resource
        );
        if !self.refresh_on_change {
            key.push_str("&static");
        }
        QueryKey(key)
    }
}

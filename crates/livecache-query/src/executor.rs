use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use livecache_store::Store;
use livecache_types::{Query, SnapshotMode};

use crate::error::{LoadError, LoadResult};
use crate::parser::RowParser;
use crate::snapshot::{IndexedRows, Snapshot};

/// Runs queries against a store and turns the rows into snapshots.
///
/// Execution is synchronous and may block on store I/O; callers on an async
/// runtime dispatch it to the blocking pool.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn Store>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run `query` once and build a snapshot in the query's mode.
    ///
    /// Materialized snapshots fail on the first row the parser rejects;
    /// indexed snapshots defer parsing, so only store errors fail the load.
    pub fn execute<R>(
        &self,
        query: &Query,
        parser: Arc<dyn RowParser<R>>,
    ) -> LoadResult<Snapshot<R>> {
        let started = Instant::now();
        let rows = self.store.run(query)?;
        let snapshot = match query.mode {
            SnapshotMode::Materialized => {
                let records = rows
                    .iter()
                    .map(|row| {
                        parser.parse(&row).map_err(|source| LoadError::ParseFailure {
                            row: row.index(),
                            source,
                        })
                    })
                    .collect::<LoadResult<Vec<R>>>()?;
                Snapshot::Materialized(records)
            }
            SnapshotMode::Indexed => Snapshot::Indexed(IndexedRows::new(Arc::new(rows), parser)),
        };
        debug!(
            resource = %query.resource,
            mode = ?query.mode,
            rows = snapshot.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query executed"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FromRow, FromRowParser};
    use livecache_store::{ColumnDef, ConflictPolicy, InMemoryStore, TableSchema};
    use livecache_types::{Filter, Order, ParseError, ResourceId, Row, Values};

    #[derive(Debug, Clone, PartialEq)]
    struct LocalFile {
        path: String,
        name: String,
    }

    impl FromRow for LocalFile {
        fn from_row(row: &Row<'_>) -> Result<Self, ParseError> {
            Ok(Self {
                path: row.get("path")?,
                name: row.get("name")?,
            })
        }
    }

    fn files() -> ResourceId {
        ResourceId::new("content://files.demo/cloudfile")
    }

    fn store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store
            .create_table(
                TableSchema::builder("cloudfile", files())
                    .column(ColumnDef::text("path").not_null())
                    .column(ColumnDef::text("name"))
                    .unique(["path"], ConflictPolicy::Replace)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let rows: Vec<Values> = (0..5)
            .map(|i| {
                Values::new()
                    .with("path", format!("/sdcard/{i}"))
                    .with("name", format!("file{i}"))
            })
            .collect();
        store.bulk_insert(&files(), &rows).unwrap();
        Arc::new(store)
    }

    fn parser() -> Arc<dyn RowParser<LocalFile>> {
        Arc::new(FromRowParser::<LocalFile>::new())
    }

    #[test]
    fn materialized_snapshot_in_insertion_order() {
        let exec = QueryExecutor::new(store());
        let snap = exec.execute(&Query::new(files()), parser()).unwrap();
        let records = snap.records().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].path, "/sdcard/0");
        assert_eq!(records[4].name, "file4");
    }

    #[test]
    fn indexed_snapshot_defers_parsing() {
        let exec = QueryExecutor::new(store());
        let query = Query::new(files())
            .filter(Filter::ne("name", "file2"))
            .order_by(Order::desc("path"))
            .indexed();
        let snap = exec.execute(&query, parser()).unwrap();
        assert_eq!(snap.mode(), SnapshotMode::Indexed);
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.get(0).unwrap().unwrap().path, "/sdcard/4");
        match &snap {
            Snapshot::Indexed(rows) => assert_eq!(rows.parsed_count(), 1),
            Snapshot::Materialized(_) => panic!("expected indexed snapshot"),
        }
    }

    #[test]
    fn parse_failure_names_the_row() {
        let exec = QueryExecutor::new(store());
        let strict: Arc<dyn RowParser<i64>> = Arc::new(|row: &Row<'_>| row.get::<i64>("path"));
        let err = exec.execute(&Query::new(files()), strict).unwrap_err();
        assert!(matches!(err, LoadError::ParseFailure { row: 0, .. }));
    }

    #[test]
    fn store_errors_map_to_load_errors() {
        let store = store();
        let exec = QueryExecutor::new(store.clone());

        let bad = Query::new(files()).project(["size"]);
        assert!(matches!(
            exec.execute(&bad, parser()).unwrap_err(),
            LoadError::MalformedQuery(_)
        ));

        store.set_available(false);
        assert!(matches!(
            exec.execute(&Query::new(files()), parser()).unwrap_err(),
            LoadError::StoreUnavailable(_)
        ));
    }
}

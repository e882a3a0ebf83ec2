use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use livecache_query::{QueryExecutor, RowParser, Snapshot};
use livecache_store::{ChangeFilter, ChangeNotification, ChangeStream, Store};
use livecache_types::{Query, QueryKey};

use crate::cache::QueryCache;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::subscription::{Owner, Subscription};

/// A subscription to the snapshots of one query.
pub type QuerySubscription<R> = Subscription<Snapshot<R>>;

struct Shared<R> {
    cache: Arc<QueryCache<Snapshot<R>>>,
    executor: QueryExecutor,
    runtime: Handle,
    shut_down: AtomicBool,
}

impl<R: Send + Sync + 'static> Shared<R> {
    fn on_change(&self, change: &ChangeNotification) {
        let mut refreshed = 0;
        for cell in self.cache.cells() {
            if !cell.addresses(&change.resource) {
                continue;
            }
            if cell.subscriber_count() > 0 {
                if cell.refresh(&self.runtime) {
                    refreshed += 1;
                }
            } else {
                cell.mark_stale();
            }
        }
        debug!(
            seq = change.seq,
            resource = %change.resource,
            kind = %change.kind,
            refreshed,
            "change applied"
        );
    }

    fn refresh_all(&self) -> usize {
        let mut refreshed = 0;
        for cell in self.cache.cells() {
            if !cell.refreshes_on_change() {
                continue;
            }
            if cell.subscriber_count() > 0 {
                if cell.refresh(&self.runtime) {
                    refreshed += 1;
                }
            } else {
                cell.mark_stale();
            }
        }
        refreshed
    }
}

/// Binds observers to query cells and keeps the cells fresh.
///
/// The manager owns a [`QueryCache`] of snapshots, starts the first load
/// for a cell when an observer arrives, and listens to the store's change
/// notifications: each notification for resource R triggers exactly one
/// reload of every active cell whose query addresses R. Loads run on the
/// tokio blocking pool.
pub struct SubscriptionManager<R> {
    shared: Arc<Shared<R>>,
    listener: AbortHandle,
}

impl<R: Send + Sync + 'static> SubscriptionManager<R> {
    /// Create a manager on the current tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> CacheResult<Self> {
        let runtime = Handle::try_current().map_err(|e| CacheError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(store, config, runtime))
    }

    /// Create a manager whose loads and change listener run on `runtime`.
    pub fn with_runtime(store: Arc<dyn Store>, config: CacheConfig, runtime: Handle) -> Self {
        let changes = store.subscribe_changes(ChangeFilter::default());
        let shared = Arc::new(Shared {
            cache: Arc::new(QueryCache::new(config.eviction)),
            executor: QueryExecutor::new(store),
            runtime,
            shut_down: AtomicBool::new(false),
        });
        let listener = shared
            .runtime
            .spawn(listen(Arc::downgrade(&shared), changes))
            .abort_handle();
        info!(eviction = ?config.eviction, "subscription manager started");
        Self { shared, listener }
    }

    pub fn cache(&self) -> &Arc<QueryCache<Snapshot<R>>> {
        &self.shared.cache
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.shared.executor
    }

    /// Subscribe `owner` to the snapshots of `query`.
    ///
    /// Equal queries share one cell. If the cell holds no value and no load
    /// is in flight, a load is started; if it already holds a value, the
    /// subscription delivers it without a new load. The first parser
    /// supplied for a key is the one its reloads use.
    pub fn observe<P>(
        &self,
        owner: &Owner,
        query: Query,
        parser: P,
    ) -> CacheResult<QuerySubscription<R>>
    where
        P: RowParser<R> + 'static,
    {
        self.observe_with(owner, query, Arc::new(parser))
    }

    /// [`observe`](Self::observe) with a shared parser.
    pub fn observe_with(
        &self,
        owner: &Owner,
        query: Query,
        parser: Arc<dyn RowParser<R>>,
    ) -> CacheResult<QuerySubscription<R>> {
        if self.is_shut_down() {
            return Err(CacheError::ShutDown);
        }
        let key = query.key();
        let (cell, subscription) = self.shared.cache.subscribe(&key, owner);

        let executor = self.shared.executor.clone();
        let source = query.clone();
        cell.set_source(
            query,
            Arc::new(move || executor.execute(&source, Arc::clone(&parser))),
        );
        let started = cell.load_if_needed(&self.shared.runtime);
        debug!(key = %key, owner = owner.name(), started, "observing");
        Ok(subscription)
    }

    /// Tear down every subscription held by `owner`. Returns how many were
    /// torn down.
    pub fn release(&self, owner: &Owner) -> usize {
        let released = self.shared.cache.release_owner(owner);
        debug!(owner = owner.name(), released, "owner released");
        released
    }

    /// Re-run the query behind `key` now. Returns `false` if the cell has
    /// no query attached.
    pub fn refresh(&self, key: &QueryKey) -> CacheResult<bool> {
        if self.is_shut_down() {
            return Err(CacheError::ShutDown);
        }
        let cell = self
            .shared
            .cache
            .get(key)
            .ok_or_else(|| CacheError::UnknownKey(key.clone()))?;
        Ok(cell.refresh(&self.shared.runtime))
    }

    /// Reload every active cell that refreshes on change. Returns how many
    /// loads were started.
    pub fn refresh_all(&self) -> usize {
        self.shared.refresh_all()
    }

    /// Keys of cells with at least one subscriber.
    pub fn active_cells(&self) -> Vec<QueryKey> {
        self.shared.cache.active_keys()
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.shared
            .cache
            .get(key)
            .map_or(0, |cell| cell.subscriber_count())
    }

    /// Stop the change listener, tear down every subscription, and drop
    /// every cell. Later calls to `observe` fail with
    /// [`CacheError::ShutDown`].
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listener.abort();
        let torn_down = self.shared.cache.clear();
        info!(torn_down, "subscription manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }
}

impl<R> Drop for SubscriptionManager<R> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl<R> fmt::Debug for SubscriptionManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("cache", &self.shared.cache)
            .field("shut_down", &self.shared.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}

async fn listen<R: Send + Sync + 'static>(shared: Weak<Shared<R>>, mut changes: ChangeStream) {
    loop {
        let received = changes.recv().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match received {
            Ok(change) => shared.on_change(&change),
            Err(RecvError::Lagged(missed)) => {
                let refreshed = shared.refresh_all();
                warn!(missed, refreshed, "change stream lagged; refreshed all cells");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("change listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellState;
    use crate::config::EvictionPolicy;
    use crate::subscription::SubscriptionState;
    use livecache_query::{FromRow, FromRowParser, LoadError};
    use livecache_store::{
        ColumnDef, ConflictPolicy, InMemoryStore, RecordId, StoreResult, TableSchema,
    };
    use livecache_types::{Filter, Order, ParseError, ResourceId, Row, RowSet, Values};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

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

    fn notes() -> ResourceId {
        ResourceId::new("content://files.demo/notes")
    }

    fn table(name: &str, resource: ResourceId) -> TableSchema {
        TableSchema::builder(name, resource)
            .column(ColumnDef::text("path").not_null())
            .column(ColumnDef::text("name"))
            .unique(["path"], ConflictPolicy::Replace)
            .build()
            .unwrap()
    }

    fn store_with_capacity(capacity: usize) -> Arc<InMemoryStore> {
        let store = InMemoryStore::with_capacity(capacity);
        store.create_table(table("cloudfile", files())).unwrap();
        store.create_table(table("notes", notes())).unwrap();
        Arc::new(store)
    }

    fn store() -> Arc<InMemoryStore> {
        store_with_capacity(64)
    }

    fn file(i: usize) -> Values {
        Values::new()
            .with("path", format!("/sdcard/{i}"))
            .with("name", format!("file{i}"))
    }

    fn manager(store: &Arc<InMemoryStore>) -> SubscriptionManager<LocalFile> {
        SubscriptionManager::new(store.clone(), CacheConfig::default()).unwrap()
    }

    fn parser() -> FromRowParser<LocalFile> {
        FromRowParser::new()
    }

    async fn next_state(sub: &mut QuerySubscription<LocalFile>) -> CellState<Snapshot<LocalFile>> {
        timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("subscription torn down")
    }

    async fn next_snapshot(sub: &mut QuerySubscription<LocalFile>) -> Arc<Snapshot<LocalFile>> {
        let state = next_state(sub).await;
        assert!(state.failure().is_none(), "unexpected failure: {:?}", state.failure());
        Arc::clone(state.value().expect("no value published"))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    /// Store whose reads block while the gate is closed.
    struct GatedStore {
        inner: Arc<InMemoryStore>,
        open: Mutex<bool>,
        opened: Condvar,
    }

    impl GatedStore {
        fn new(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                open: Mutex::new(true),
                opened: Condvar::new(),
            }
        }

        fn set_open(&self, open: bool) {
            *self.open.lock().unwrap() = open;
            self.opened.notify_all();
        }
    }

    impl Store for GatedStore {
        fn query(
            &self,
            resource: &ResourceId,
            projection: Option<&[String]>,
            filter: Option<&Filter>,
            order: &[Order],
        ) -> StoreResult<RowSet> {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            drop(open);
            self.inner.query(resource, projection, filter, order)
        }

        fn insert(&self, resource: &ResourceId, values: &Values) -> StoreResult<RecordId> {
            self.inner.insert(resource, values)
        }

        fn bulk_insert(&self, resource: &ResourceId, rows: &[Values]) -> StoreResult<usize> {
            self.inner.bulk_insert(resource, rows)
        }

        fn update(
            &self,
            resource: &ResourceId,
            patch: &Values,
            filter: Option<&Filter>,
        ) -> StoreResult<usize> {
            self.inner.update(resource, patch, filter)
        }

        fn delete(&self, resource: &ResourceId, filter: Option<&Filter>) -> StoreResult<usize> {
            self.inner.delete(resource, filter)
        }

        fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeStream {
            self.inner.subscribe_changes(filter)
        }
    }

    fn paths(snapshot: &Snapshot<LocalFile>) -> Vec<String> {
        snapshot.iter().map(|r| r.unwrap().path.clone()).collect()
    }

    // ------------------------------------------------------------------
    // Loading & refreshing
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn five_files_then_update_refreshes_the_same_observer() {
        let store = store();
        let rows: Vec<Values> = (0..5).map(file).collect();
        store.bulk_insert(&files(), &rows).unwrap();

        let manager = manager(&store);
        let owner = Owner::new("main");
        let mut sub = manager.observe(&owner, Query::new(files()), parser()).unwrap();

        let first = next_snapshot(&mut sub).await;
        assert_eq!(
            paths(&first),
            vec!["/sdcard/0", "/sdcard/1", "/sdcard/2", "/sdcard/3", "/sdcard/4"]
        );
        assert_eq!(sub.state(), SubscriptionState::Ready);

        store
            .update(
                &files(),
                &Values::new().with("name", "renamed"),
                Some(&Filter::eq("path", "/sdcard/2")),
            )
            .unwrap();
        let second = next_snapshot(&mut sub).await;
        assert_eq!(second.len(), 5);
        assert_eq!(second.get(2).unwrap().unwrap().name, "renamed");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn second_observer_gets_cached_snapshot_without_reload() {
        let store = store();
        store.insert(&files(), &file(0)).unwrap();
        let manager = manager(&store);

        let mut a = manager
            .observe(&Owner::new("a"), Query::new(files()), parser())
            .unwrap();
        let first = next_snapshot(&mut a).await;

        let mut b = manager
            .observe(&Owner::new("b"), Query::new(files()), parser())
            .unwrap();
        let cached = timeout(Duration::from_millis(100), b.next())
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, cached.value().unwrap()));

        let cell = manager.cache().get(&Query::new(files()).key()).unwrap();
        assert_eq!(cell.last_ticket(), 1);
        assert_eq!(manager.subscriber_count(&Query::new(files()).key()), 2);
    }

    #[tokio::test]
    async fn unrelated_resource_does_not_refresh() {
        let store = store();
        store.insert(&files(), &file(0)).unwrap();
        let manager = manager(&store);
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()), parser())
            .unwrap();
        next_snapshot(&mut sub).await;

        store.insert(&notes(), &file(9)).unwrap();
        store.insert(&files(), &file(1)).unwrap();
        let refreshed = next_snapshot(&mut sub).await;
        assert_eq!(refreshed.len(), 2);

        let cell = manager.cache().get(&Query::new(files()).key()).unwrap();
        assert_eq!(cell.last_ticket(), 2);
    }

    #[tokio::test]
    async fn one_reload_per_notification_not_per_subscription() {
        let store = store();
        let manager = manager(&store);
        let query = Query::new(files());
        let mut subs: Vec<_> = (0..3)
            .map(|i| {
                manager
                    .observe(&Owner::new(format!("o{i}")), query.clone(), parser())
                    .unwrap()
            })
            .collect();
        for sub in &mut subs {
            next_snapshot(sub).await;
        }

        store.insert(&files(), &file(0)).unwrap();
        for sub in &mut subs {
            assert_eq!(next_snapshot(sub).await.len(), 1);
        }
        let cell = manager.cache().get(&query.key()).unwrap();
        assert_eq!(cell.last_ticket(), 2);
    }

    #[tokio::test]
    async fn row_level_change_refreshes_collection_query() {
        let store = store();
        let id = store.insert(&files(), &file(0)).unwrap();
        let manager = manager(&store);
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()), parser())
            .unwrap();
        next_snapshot(&mut sub).await;

        store
            .update(&files().child(id), &Values::new().with("name", "row"), None)
            .unwrap();
        let refreshed = next_snapshot(&mut sub).await;
        assert_eq!(refreshed.get(0).unwrap().unwrap().name, "row");
    }

    #[tokio::test]
    async fn static_queries_ignore_changes() {
        let store = store();
        let manager = manager(&store);
        let query = Query::new(files()).static_result();
        let mut sub = manager.observe(&Owner::new("main"), query.clone(), parser()).unwrap();
        next_snapshot(&mut sub).await;

        store.insert(&files(), &file(0)).unwrap();
        assert!(timeout(Duration::from_millis(100), sub.next()).await.is_err());
        assert!(manager.refresh(&query.key()).unwrap());
        assert_eq!(next_snapshot(&mut sub).await.len(), 1);
    }

    #[tokio::test]
    async fn indexed_snapshots_parse_on_demand() {
        let store = store();
        let rows: Vec<Values> = (0..5).map(file).collect();
        store.bulk_insert(&files(), &rows).unwrap();
        let manager = manager(&store);
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()).indexed(), parser())
            .unwrap();
        let snapshot = next_snapshot(&mut sub).await;
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.get(4).unwrap().unwrap().name, "file4");
        assert!(snapshot.records().is_none());
    }

    #[tokio::test]
    async fn lagged_listener_refreshes_every_active_cell() {
        let store = store_with_capacity(1);
        let manager = manager(&store);
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()), parser())
            .unwrap();
        next_snapshot(&mut sub).await;

        for i in 0..3 {
            store.insert(&notes(), &file(i)).unwrap();
        }
        next_snapshot(&mut sub).await;
        let cell = manager.cache().get(&Query::new(files()).key()).unwrap();
        assert_eq!(cell.last_ticket(), 2);
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn failures_are_distinct_from_pending_and_keep_data() {
        let store = store();
        store.insert(&files(), &file(0)).unwrap();
        store.set_available(false);
        let manager = manager(&store);
        let query = Query::new(files());
        let mut sub = manager.observe(&Owner::new("main"), query.clone(), parser()).unwrap();

        let failed = next_state(&mut sub).await;
        assert!(matches!(failed.failure(), Some(LoadError::StoreUnavailable(_))));
        assert!(!failed.has_value());

        store.set_available(true);
        manager.refresh(&query.key()).unwrap();
        let recovered = next_state(&mut sub).await;
        assert_eq!(recovered.value().unwrap().len(), 1);
        assert!(recovered.failure().is_none());

        store.set_available(false);
        manager.refresh(&query.key()).unwrap();
        let stale = next_state(&mut sub).await;
        assert!(stale.failure().is_some());
        assert_eq!(stale.value().unwrap().len(), 1);
        assert_eq!(sub.state(), SubscriptionState::Ready);
    }

    #[tokio::test]
    async fn malformed_query_surfaces_as_failure() {
        let store = store();
        let manager = manager(&store);
        let mut sub = manager
            .observe(
                &Owner::new("main"),
                Query::new(files()).filter(Filter::eq("owner", "me")),
                parser(),
            )
            .unwrap();
        let state = next_state(&mut sub).await;
        assert!(matches!(state.failure(), Some(LoadError::MalformedQuery(_))));
    }

    #[tokio::test]
    async fn refresh_of_unknown_key_fails() {
        let store = store();
        let manager = manager(&store);
        let key = Query::new(files()).key();
        assert!(matches!(manager.refresh(&key), Err(CacheError::UnknownKey(_))));
    }

    // ------------------------------------------------------------------
    // Lifetimes
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn release_tears_down_every_subscription_of_the_owner() {
        let store = store();
        let manager = manager(&store);
        let owner = Owner::new("screen");
        let mut a = manager.observe(&owner, Query::new(files()), parser()).unwrap();
        let mut b = manager.observe(&owner, Query::new(notes()), parser()).unwrap();
        next_snapshot(&mut a).await;
        next_snapshot(&mut b).await;

        assert_eq!(manager.release(&owner), 2);
        assert!(a.next().await.is_none());
        assert!(b.next().await.is_none());
        assert_eq!(a.state(), SubscriptionState::TornDown);
        assert!(manager.active_cells().is_empty());

        store.insert(&files(), &file(0)).unwrap();
        assert!(a.next().await.is_none());
    }

    #[tokio::test]
    async fn last_observer_leaving_cancels_the_load() {
        let store = store();
        store.set_available(false);
        let manager = SubscriptionManager::<LocalFile>::new(
            store.clone(),
            CacheConfig {
                eviction: EvictionPolicy::Sticky { max_cells: 5 },
                ..CacheConfig::default()
            },
        )
        .unwrap();
        let query = Query::new(files());
        let sub = manager.observe(&Owner::new("main"), query.clone(), parser()).unwrap();
        let cell = manager.cache().get(&query.key()).unwrap();
        assert_eq!(cell.loads_in_flight(), 1);

        drop(sub);
        assert_eq!(cell.loads_in_flight(), 0);
        sleep(Duration::from_millis(50)).await;
        assert!(cell.current().is_none());
        assert!(cell.state().failure().is_none());
    }

    #[tokio::test]
    async fn idle_sticky_cell_is_marked_stale_and_reloaded_on_return() {
        let store = store();
        let manager = manager(&store);
        let query = Query::new(files());
        let mut sub = manager.observe(&Owner::new("a"), query.clone(), parser()).unwrap();
        next_snapshot(&mut sub).await;
        drop(sub);

        store.insert(&files(), &file(0)).unwrap();
        sleep(Duration::from_millis(50)).await;
        let cell = manager.cache().get(&query.key()).unwrap();
        assert_eq!(cell.last_ticket(), 1);

        let mut back = manager.observe(&Owner::new("b"), query.clone(), parser()).unwrap();
        let cached = next_snapshot(&mut back).await;
        assert_eq!(cached.len(), 0);
        let fresh = next_snapshot(&mut back).await;
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn refresh_canceled_by_leaving_observer_reloads_on_return() {
        let inner = store();
        let store = Arc::new(GatedStore::new(inner.clone()));
        let manager =
            SubscriptionManager::<LocalFile>::new(store.clone(), CacheConfig::default()).unwrap();
        let query = Query::new(files());
        let mut sub = manager.observe(&Owner::new("a"), query.clone(), parser()).unwrap();
        assert_eq!(next_snapshot(&mut sub).await.len(), 0);

        store.set_open(false);
        inner.insert(&files(), &file(0)).unwrap();
        let cell = manager.cache().get(&query.key()).unwrap();
        wait_until(|| cell.loads_in_flight() == 1).await;

        drop(sub);
        assert_eq!(cell.loads_in_flight(), 0);
        store.set_open(true);

        let mut back = manager.observe(&Owner::new("b"), query.clone(), parser()).unwrap();
        assert_eq!(next_snapshot(&mut back).await.len(), 0);
        assert_eq!(next_snapshot(&mut back).await.len(), 1);
        assert_eq!(inner.row_count(&files()).unwrap(), 1);
    }

    #[tokio::test]
    async fn panicking_parser_surfaces_as_failure() {
        let store = store();
        store.insert(&files(), &file(0)).unwrap();
        let manager = manager(&store);
        let parser = |_: &Row<'_>| -> Result<LocalFile, ParseError> { panic!("bad record") };
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()), parser)
            .unwrap();
        let state = next_state(&mut sub).await;
        assert!(matches!(state.failure(), Some(LoadError::Panicked(_))));
        assert!(!state.has_value());
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let store = store();
        let manager = manager(&store);
        let mut sub = manager
            .observe(&Owner::new("main"), Query::new(files()), parser())
            .unwrap();
        next_snapshot(&mut sub).await;

        manager.shutdown();
        assert!(sub.next().await.is_none());
        assert!(manager.cache().is_empty());
        assert!(matches!(
            manager.observe(&Owner::new("late"), Query::new(files()), parser()),
            Err(CacheError::ShutDown)
        ));
        assert!(matches!(
            manager.refresh(&Query::new(files()).key()),
            Err(CacheError::ShutDown)
        ));
    }

    #[test]
    fn new_outside_runtime_fails() {
        let store = store();
        let err = SubscriptionManager::<LocalFile>::new(store, CacheConfig::default()).unwrap_err();
        assert!(matches!(err, CacheError::NoRuntime(_)));
    }
}

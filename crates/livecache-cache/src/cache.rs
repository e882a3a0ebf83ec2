use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use livecache_types::QueryKey;

use crate::cell::ObservableCell;
use crate::config::EvictionPolicy;
use crate::subscription::{Owner, Subscription};

struct Entry<V> {
    cell: Arc<ObservableCell<V>>,
    /// Logical time the cell last became idle; `None` while subscribed.
    idle_since: Option<u64>,
}

/// Map from [`QueryKey`] to the one live [`ObservableCell`] for that key.
///
/// The cache exclusively owns its cells; subscriptions and loads hold weak
/// references. Lookups and eviction run under one mutex, so concurrent
/// callers always agree on the cell for a key.
pub struct QueryCache<V> {
    cells: Mutex<HashMap<QueryKey, Entry<V>>>,
    policy: EvictionPolicy,
    clock: AtomicU64,
}

impl<V> QueryCache<V> {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            policy,
            clock: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// The cell for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: &QueryKey) -> Arc<ObservableCell<V>> {
        let mut cells = self.lock();
        self.entry_locked(&mut cells, key)
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<ObservableCell<V>>> {
        self.lock().get(key).map(|e| Arc::clone(&e.cell))
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every cached cell, in no particular order.
    pub fn cells(&self) -> Vec<Arc<ObservableCell<V>>> {
        self.lock().values().map(|e| Arc::clone(&e.cell)).collect()
    }

    /// Keys of cells with at least one subscriber.
    pub fn active_keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.cell.subscriber_count() > 0)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Tear down every subscription held by `owner`. Returns how many
    /// subscriptions were torn down.
    pub fn release_owner(&self, owner: &Owner) -> usize {
        let mut cells = self.lock();
        let mut released = 0;
        let mut emptied = Vec::new();
        for (key, entry) in cells.iter() {
            let (removed, now_empty) = entry.cell.teardown_owner(owner);
            released += removed;
            if now_empty {
                emptied.push(key.clone());
            }
        }
        for key in emptied {
            self.idle_locked(&mut cells, &key);
        }
        released
    }

    /// Tear down every subscription and drop every cell.
    pub fn clear(&self) -> usize {
        let mut cells = self.lock();
        let torn_down = cells.values().map(|e| e.cell.teardown_all()).sum();
        cells.clear();
        torn_down
    }

    /// Called after `cell` lost its last subscriber.
    pub(crate) fn cell_idle(&self, cell: &Arc<ObservableCell<V>>) {
        let mut cells = self.lock();
        match cells.get(cell.key()) {
            Some(entry) if Arc::ptr_eq(&entry.cell, cell) => {}
            _ => return,
        }
        self.idle_locked(&mut cells, cell.key());
    }

    fn idle_locked(&self, cells: &mut HashMap<QueryKey, Entry<V>>, key: &QueryKey) {
        let Some(entry) = cells.get_mut(key) else {
            return;
        };
        if entry.cell.subscriber_count() > 0 {
            return;
        }
        match self.policy {
            EvictionPolicy::Strict => {
                cells.remove(key);
                debug!(key = %key, "idle cell evicted");
            }
            EvictionPolicy::Sticky { .. } => {
                entry.idle_since = Some(self.tick());
            }
        }
    }

    fn entry_locked(
        &self,
        cells: &mut HashMap<QueryKey, Entry<V>>,
        key: &QueryKey,
    ) -> Arc<ObservableCell<V>> {
        if let Some(entry) = cells.get(key) {
            return Arc::clone(&entry.cell);
        }
        self.make_room(cells);
        let cell = Arc::new(ObservableCell::new(key.clone()));
        cells.insert(
            key.clone(),
            Entry {
                cell: Arc::clone(&cell),
                idle_since: Some(self.tick()),
            },
        );
        debug!(key = %key, cells = cells.len(), "cell created");
        cell
    }

    /// Under the sticky policy, evict idle cells oldest-first until a new
    /// cell fits under the bound.
    fn make_room(&self, cells: &mut HashMap<QueryKey, Entry<V>>) {
        let EvictionPolicy::Sticky { max_cells } = self.policy else {
            return;
        };
        while cells.len() >= max_cells.max(1) {
            let oldest = cells
                .iter()
                .filter(|(_, e)| e.cell.subscriber_count() == 0)
                .min_by_key(|(_, e)| e.idle_since.unwrap_or(u64::MAX))
                .map(|(k, _)| k.clone());
            let Some(key) = oldest else {
                break;
            };
            if let Some(entry) = cells.remove(&key) {
                entry.cell.cancel_loads();
            }
            debug!(key = %key, "idle cell evicted to make room");
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<V>>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Send + Sync + 'static> QueryCache<V> {
    /// Get or create the cell for `key` and subscribe `owner` to it, as one
    /// step, so the cell cannot be evicted in between.
    pub fn subscribe(
        self: &Arc<Self>,
        key: &QueryKey,
        owner: &Owner,
    ) -> (Arc<ObservableCell<V>>, Subscription<V>) {
        let mut cells = self.lock();
        let cell = self.entry_locked(&mut cells, key);
        if let Some(entry) = cells.get_mut(key) {
            entry.idle_since = None;
        }
        let subscription = cell.subscribe_in(owner, Arc::downgrade(self));
        (cell, subscription)
    }
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("policy", &self.policy)
            .field("cells", &self.len())
            .finish()
    }
}

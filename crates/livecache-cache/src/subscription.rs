use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tracing::debug;

use livecache_types::QueryKey;

use crate::cache::QueryCache;
use crate::cell::{CellState, CellStatus, ObservableCell};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Explicit lifetime scope for subscriptions.
///
/// A host creates one owner per observing component and calls
/// [`SubscriptionManager::release`](crate::SubscriptionManager::release)
/// when that component goes away. Clones refer to the same owner.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    id: u64,
    name: Arc<str>,
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.into()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owner({}#{})", self.name, self.id)
    }
}

/// Where a subscription is in its lifecycle.
///
/// `Created → Loading → Ready ⇄ Refreshing → TornDown`. `TornDown` is
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered; no value yet and no load in flight.
    Created,
    /// First load in flight.
    Loading,
    /// A value is available.
    Ready,
    /// A value is available and a newer load is in flight.
    Refreshing,
    /// No further notifications will be delivered.
    TornDown,
}

/// One observer's binding to an [`ObservableCell`].
///
/// Holds only a weak reference to the cell. Dropping the subscription
/// unsubscribes it.
pub struct Subscription<V> {
    id: u64,
    owner: Owner,
    key: QueryKey,
    cell: Weak<ObservableCell<V>>,
    cache: Weak<QueryCache<V>>,
    rx: watch::Receiver<CellState<V>>,
    teardown: watch::Receiver<()>,
    detached: bool,
}

impl<V> Subscription<V> {
    pub(crate) fn new(
        id: u64,
        owner: Owner,
        key: QueryKey,
        cell: Weak<ObservableCell<V>>,
        cache: Weak<QueryCache<V>>,
        rx: watch::Receiver<CellState<V>>,
        teardown: watch::Receiver<()>,
    ) -> Self {
        Self {
            id,
            owner,
            key,
            cell,
            cache,
            rx,
            teardown,
            detached: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the next published value or failure.
    ///
    /// Returns immediately if the cell already held a value when this
    /// subscription was created and it has not been read yet. Returns
    /// `None` once the subscription is torn down.
    pub async fn next(&mut self) -> Option<CellState<V>> {
        if self.is_torn_down() {
            return None;
        }
        let changed = tokio::select! {
            biased;
            _ = self.teardown.changed() => false,
            result = self.rx.changed() => result.is_ok(),
        };
        if !changed {
            return None;
        }
        Some(self.rx.borrow_and_update().clone())
    }

    /// Latest value held by the cell, without waiting.
    pub fn current(&self) -> Option<Arc<V>> {
        self.rx.borrow().value().cloned()
    }

    pub fn status(&self) -> CellStatus {
        self.rx.borrow().status().clone()
    }

    pub fn state(&self) -> SubscriptionState {
        if self.is_torn_down() {
            return SubscriptionState::TornDown;
        }
        let state = self.rx.borrow();
        match state.status() {
            CellStatus::Pending => SubscriptionState::Created,
            CellStatus::Loading => SubscriptionState::Loading,
            CellStatus::Ready => SubscriptionState::Ready,
            CellStatus::Refreshing => SubscriptionState::Refreshing,
            CellStatus::Failed(_) if state.has_value() => SubscriptionState::Ready,
            CellStatus::Failed(_) => SubscriptionState::Created,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.detached || self.teardown.has_changed().is_err() || self.rx.has_changed().is_err()
    }

    /// Remove this observer from its cell. If it was the last one, the
    /// cell's in-flight loads are canceled and the cell becomes idle.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        let Some(cell) = self.cell.upgrade() else {
            return;
        };
        if cell.unsubscribe(self.id) {
            if let Some(cache) = self.cache.upgrade() {
                cache.cell_idle(&cell);
            }
        }
        debug!(key = %self.key, subscription = self.id, "unsubscribed");
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

//! Observable cells: the latest value for one query identity.
//!
//! A cell publishes through a `tokio::sync::watch` channel, so every
//! subscriber sees the same `Arc` and intermediate values that nobody read
//! are skipped. Loads are stamped with monotonically increasing tickets; a
//! completion is published only if its ticket is newer than the last one
//! accepted, so a load that started earlier never overwrites one that
//! started later.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use livecache_query::{LoadError, LoadResult};
use livecache_types::{Query, QueryKey, ResourceId};

use crate::cache::QueryCache;
use crate::subscription::{Owner, Subscription};

/// Load phase of a cell.
#[derive(Clone, Debug)]
pub enum CellStatus {
    /// Nothing loaded and nothing in flight.
    Pending,
    /// First load in flight.
    Loading,
    /// Holding a value, nothing in flight.
    Ready,
    /// Holding a value while a newer load is in flight.
    Refreshing,
    /// The most recent accepted load failed. Any earlier value is kept.
    Failed(Arc<LoadError>),
}

/// What a subscriber observes: the latest published value, if any, and the
/// cell's load phase.
#[derive(Debug)]
pub struct CellState<V> {
    value: Option<Arc<V>>,
    status: CellStatus,
}

impl<V> CellState<V> {
    fn pending() -> Self {
        Self {
            value: None,
            status: CellStatus::Pending,
        }
    }

    pub fn value(&self) -> Option<&Arc<V>> {
        self.value.as_ref()
    }

    pub fn status(&self) -> &CellStatus {
        &self.status
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The failure of the most recent accepted load, if it failed.
    pub fn failure(&self) -> Option<&LoadError> {
        match &self.status {
            CellStatus::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// `true` while a load is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.status, CellStatus::Loading | CellStatus::Refreshing)
    }
}

impl<V> Clone for CellState<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            status: self.status.clone(),
        }
    }
}

/// Re-runnable load for a cell.
pub type Loader<V> = Arc<dyn Fn() -> LoadResult<V> + Send + Sync>;

struct Source<V> {
    query: Query,
    load: Loader<V>,
}

struct Slot {
    id: u64,
    owner: Owner,
    /// Dropping the sender tears the subscription down.
    _teardown: watch::Sender<()>,
}

struct Inner<V> {
    slots: Vec<Slot>,
    next_slot: u64,
    last_ticket: u64,
    accepted: u64,
    in_flight: HashMap<u64, AbortHandle>,
    source: Option<Source<V>>,
    stale: bool,
}

/// Latest value for one [`QueryKey`], plus its ordered subscribers and
/// in-flight loads.
pub struct ObservableCell<V> {
    key: QueryKey,
    state: watch::Sender<CellState<V>>,
    inner: Mutex<Inner<V>>,
}

impl<V> ObservableCell<V> {
    pub fn new(key: QueryKey) -> Self {
        let (state, _) = watch::channel(CellState::pending());
        Self {
            key,
            state,
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                next_slot: 1,
                last_ticket: 0,
                accepted: 0,
                in_flight: HashMap::new(),
                source: None,
                stale: false,
            }),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> CellState<V> {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<V>> {
        self.state.borrow().value.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn loads_in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Ticket of the most recently started load or post.
    pub fn last_ticket(&self) -> u64 {
        self.lock().last_ticket
    }

    /// The query this cell re-runs, if one is attached.
    pub fn query(&self) -> Option<Query> {
        self.lock().source.as_ref().map(|s| s.query.clone())
    }

    /// Attach the query and loader used for refreshes. The first source
    /// attached wins; returns `false` if one was already present.
    pub fn set_source(&self, query: Query, load: Loader<V>) -> bool {
        let mut inner = self.lock();
        if inner.source.is_some() {
            return false;
        }
        inner.source = Some(Source { query, load });
        true
    }

    /// `true` if a change to `resource` should re-run this cell's query.
    pub fn addresses(&self, resource: &ResourceId) -> bool {
        self.lock().source.as_ref().is_some_and(|s| {
            s.query.refresh_on_change && s.query.resource.overlaps(resource)
        })
    }

    pub fn refreshes_on_change(&self) -> bool {
        self.lock()
            .source
            .as_ref()
            .is_some_and(|s| s.query.refresh_on_change)
    }

    /// Record that the held value is out of date; the next
    /// [`load_if_needed`](Self::load_if_needed) reloads.
    pub fn mark_stale(&self) {
        self.lock().stale = true;
    }

    /// Replace the held value and notify every subscriber.
    ///
    /// A post counts as the newest load: loads still in flight are aborted
    /// and their results discarded.
    pub fn post(&self, value: V) {
        let mut inner = self.lock();
        inner.last_ticket += 1;
        inner.accepted = inner.last_ticket;
        inner.stale = false;
        for (_, handle) in inner.in_flight.drain() {
            handle.abort();
        }
        self.state.send_modify(|s| {
            s.value = Some(Arc::new(value));
            s.status = CellStatus::Ready;
        });
        debug!(key = %self.key, ticket = inner.accepted, "value posted");
    }

    /// Remove one subscriber. Returns `true` if it was the last one, in
    /// which case every in-flight load has been canceled.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner.slots.iter().position(|s| s.id == id) else {
            return false;
        };
        inner.slots.remove(pos);
        if inner.slots.is_empty() {
            self.cancel_locked(&mut inner);
            true
        } else {
            false
        }
    }

    /// Tear down every subscription held by `owner`. Returns how many were
    /// torn down and whether the cell is now without subscribers.
    pub fn teardown_owner(&self, owner: &Owner) -> (usize, bool) {
        let mut inner = self.lock();
        let before = inner.slots.len();
        inner.slots.retain(|s| &s.owner != owner);
        let removed = before - inner.slots.len();
        let emptied = removed > 0 && inner.slots.is_empty();
        if emptied {
            self.cancel_locked(&mut inner);
        }
        (removed, emptied)
    }

    /// Tear down every subscription and cancel every load.
    pub fn teardown_all(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.slots.len();
        inner.slots.clear();
        self.cancel_locked(&mut inner);
        removed
    }

    /// Abort in-flight loads and invalidate their tickets.
    pub fn cancel_loads(&self) {
        let mut inner = self.lock();
        self.cancel_locked(&mut inner);
    }

    /// Accept or drop the result of load `ticket`. Returns `true` if the
    /// result was published (as a value or a failure).
    pub(crate) fn complete(&self, ticket: u64, result: LoadResult<V>) -> bool {
        let mut inner = self.lock();
        inner.in_flight.remove(&ticket);
        if ticket <= inner.accepted {
            debug!(key = %self.key, ticket, accepted = inner.accepted, "stale load dropped");
            self.settle(&inner);
            return false;
        }
        if matches!(result, Err(LoadError::Canceled)) {
            self.settle(&inner);
            return false;
        }

        inner.accepted = ticket;
        inner.in_flight.retain(|&t, handle| {
            if t < ticket {
                handle.abort();
                false
            } else {
                true
            }
        });
        let loading = !inner.in_flight.is_empty();
        match result {
            Ok(value) => {
                self.state.send_modify(|s| {
                    s.value = Some(Arc::new(value));
                    s.status = if loading {
                        CellStatus::Refreshing
                    } else {
                        CellStatus::Ready
                    };
                });
                debug!(key = %self.key, ticket, "load published");
            }
            Err(err) => {
                warn!(key = %self.key, ticket, error = %err, "load failed");
                self.state
                    .send_modify(|s| s.status = CellStatus::Failed(Arc::new(err)));
            }
        }
        true
    }

    fn cancel_locked(&self, inner: &mut Inner<V>) {
        if inner.in_flight.is_empty() {
            return;
        }
        inner.accepted = inner.last_ticket;
        inner.stale = true;
        let canceled = inner.in_flight.len();
        for (_, handle) in inner.in_flight.drain() {
            handle.abort();
        }
        self.settle(inner);
        debug!(key = %self.key, canceled, "in-flight loads canceled");
    }

    /// Bring the load phase in line with the in-flight set without waking
    /// subscribers.
    fn settle(&self, inner: &Inner<V>) {
        let loading = !inner.in_flight.is_empty();
        self.state.send_if_modified(|s| {
            let has_value = s.value.is_some();
            s.status = match (&s.status, loading, has_value) {
                (CellStatus::Failed(_), false, _) => return false,
                (_, true, true) => CellStatus::Refreshing,
                (_, true, false) => CellStatus::Loading,
                (_, false, true) => CellStatus::Ready,
                (_, false, false) => CellStatus::Pending,
            };
            false
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Send + Sync + 'static> ObservableCell<V> {
    /// Register a standalone subscriber.
    ///
    /// If the cell already holds a value or a failure, the subscriber's
    /// first [`Subscription::next`] returns it without waiting.
    pub fn subscribe(self: &Arc<Self>, owner: &Owner) -> Subscription<V> {
        self.subscribe_in(owner, Weak::new())
    }

    pub(crate) fn subscribe_in(
        self: &Arc<Self>,
        owner: &Owner,
        cache: Weak<QueryCache<V>>,
    ) -> Subscription<V> {
        let mut inner = self.lock();
        let id = inner.next_slot;
        inner.next_slot += 1;
        let (teardown_tx, teardown_rx) = watch::channel(());
        inner.slots.push(Slot {
            id,
            owner: owner.clone(),
            _teardown: teardown_tx,
        });

        let mut rx = self.state.subscribe();
        let deliver = {
            let s = rx.borrow();
            s.value.is_some() || matches!(s.status, CellStatus::Failed(_))
        };
        if deliver {
            rx.mark_changed();
        }
        debug!(key = %self.key, subscription = id, owner = owner.name(), "subscribed");
        Subscription::new(
            id,
            owner.clone(),
            self.key.clone(),
            Arc::downgrade(self),
            cache,
            rx,
            teardown_rx,
        )
    }

    /// Start a load on `runtime`. The loader runs on the blocking pool; its
    /// result is published only if no newer load has been accepted and the
    /// load was not canceled. Returns the load's ticket.
    pub fn start_load<F>(self: &Arc<Self>, runtime: &Handle, load: F) -> u64
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        let mut inner = self.lock();
        self.start_locked(&mut inner, runtime, load)
    }

    /// Re-run the attached source. Returns `false` if no source is attached.
    pub fn refresh(self: &Arc<Self>, runtime: &Handle) -> bool {
        let mut inner = self.lock();
        let Some(load) = inner.source.as_ref().map(|s| Arc::clone(&s.load)) else {
            return false;
        };
        self.start_locked(&mut inner, runtime, move || load());
        true
    }

    /// Run the attached source if the cell holds no value (or a stale one)
    /// and nothing is in flight. Returns `true` if a load was started.
    pub fn load_if_needed(self: &Arc<Self>, runtime: &Handle) -> bool {
        let mut inner = self.lock();
        let has_value = self.state.borrow().value.is_some();
        if !inner.in_flight.is_empty() || (has_value && !inner.stale) {
            return false;
        }
        let Some(load) = inner.source.as_ref().map(|s| Arc::clone(&s.load)) else {
            return false;
        };
        self.start_locked(&mut inner, runtime, move || load());
        true
    }

    fn start_locked<F>(self: &Arc<Self>, inner: &mut Inner<V>, runtime: &Handle, load: F) -> u64
    where
        F: FnOnce() -> LoadResult<V> + Send + 'static,
    {
        inner.last_ticket += 1;
        inner.stale = false;
        let ticket = inner.last_ticket;
        let cell = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let result = match tokio::task::spawn_blocking(load).await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    let message = panic_message(err.into_panic());
                    warn!(ticket, panic = %message, "load panicked");
                    Err(LoadError::Panicked(message))
                }
                Err(err) => {
                    debug!(ticket, error = %err, "load task canceled");
                    Err(LoadError::Canceled)
                }
            };
            if let Some(cell) = cell.upgrade() {
                cell.complete(ticket, result);
            }
        });
        inner.in_flight.insert(ticket, task.abort_handle());
        self.settle(inner);
        debug!(key = %self.key, ticket, "load started");
        ticket
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<V> fmt::Debug for ObservableCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ObservableCell")
            .field("key", &self.key)
            .field("subscribers", &inner.slots.len())
            .field("in_flight", &inner.in_flight.len())
            .field("last_ticket", &inner.last_ticket)
            .finish()
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use livecache_types::ResourceId;

/// Kind of mutation that produced a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Emitted by a store after every successful mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Monotonic per-router sequence number.
    pub seq: u64,
    /// The resource the mutation addressed.
    pub resource: ResourceId,
    pub kind: ChangeKind,
    /// Rows inserted, updated, or deleted.
    pub affected: usize,
}

/// Selects the notifications a subscriber receives.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// If set, only notifications whose resource overlaps one of these.
    pub resources: Option<Vec<ResourceId>>,
    /// If set, only these mutation kinds.
    pub kinds: Option<Vec<ChangeKind>>,
}

impl ChangeFilter {
    /// Notifications for `resource`, its descendants, and its ancestors.
    pub fn resource(resource: ResourceId) -> Self {
        Self {
            resources: Some(vec![resource]),
            kinds: None,
        }
    }

    pub fn matches(&self, change: &ChangeNotification) -> bool {
        if let Some(ref resources) = self.resources {
            if !resources.iter().any(|r| r.overlaps(&change.resource)) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&change.kind) {
                return false;
            }
        }
        true
    }
}

/// A broadcast receiver of change notifications.
pub type ChangeStream = broadcast::Receiver<ChangeNotification>;

struct Subscriber {
    filter: ChangeFilter,
    sender: broadcast::Sender<ChangeNotification>,
}

/// Fan-out of change notifications to filtered subscribers.
///
/// Each subscriber owns a bounded broadcast channel. A subscriber that falls
/// behind observes `RecvError::Lagged` rather than blocking the store.
pub struct ChangeRouter {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
    seq: AtomicU64,
}

impl ChangeRouter {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a subscriber; the stream yields every later matching change.
    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, sender });
        rx
    }

    /// Stamp and route a notification. Closed subscribers are pruned.
    pub fn notify(
        &self,
        resource: ResourceId,
        kind: ChangeKind,
        affected: usize,
    ) -> ChangeNotification {
        let change = ChangeNotification {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            resource,
            kind,
            affected,
        };
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|sub| {
            if sub.filter.matches(&change) {
                sub.sender.send(change.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        trace!(seq = change.seq, resource = %change.resource, kind = %kind, "change routed");
        change
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ChangeRouter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ChangeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRouter")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

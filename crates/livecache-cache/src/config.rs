use serde::{Deserialize, Serialize};

/// What happens to a cell once its last subscriber leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Idle cells keep their snapshot so re-subscribing is instant. When a
    /// new cell would bring the count to `max_cells`, idle cells are evicted
    /// oldest-first. Cells with subscribers are never evicted.
    Sticky { max_cells: usize },
    /// A cell is evicted as soon as its last subscriber leaves.
    Strict,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Sticky { max_cells: 5 }
    }
}

/// Configuration for a [`SubscriptionManager`](crate::SubscriptionManager).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction: EvictionPolicy,
    /// Capacity of the store's change broadcast buffer. A listener that
    /// falls further behind than this refreshes every active cell.
    pub notification_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::default(),
            notification_capacity: 256,
        }
    }
}

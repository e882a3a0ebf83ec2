//! Observable query cache for livecache.
//!
//! Each distinct [`QueryKey`](livecache_types::QueryKey) maps to exactly one
//! [`ObservableCell`] holding the latest snapshot for that query. Observers
//! subscribe through a [`SubscriptionManager`], which starts loads, reloads
//! cells when the store reports a change to a resource they address, and
//! tears subscriptions down when their [`Owner`] is released.
//!
//! # Guarantees
//!
//! 1. Equal queries share one cell and one load.
//! 2. A load that started earlier never overwrites one that started later.
//! 3. Every subscriber of a cell sees the same `Arc` for a published value.
//! 4. A failure is published without discarding the last good value.
//! 5. When the last subscriber leaves, in-flight loads are canceled.
//!
//! # Eviction
//!
//! - [`EvictionPolicy::Sticky`] -- idle cells are kept, up to a bound, so a
//!   returning observer sees the cached value at once
//! - [`EvictionPolicy::Strict`] -- a cell is dropped as soon as it has no
//!   subscribers

pub mod cache;
pub mod cell;
pub mod config;
pub mod error;
pub mod manager;
pub mod subscription;

pub use cache::QueryCache;
pub use cell::{CellState, CellStatus, Loader, ObservableCell};
pub use config::{CacheConfig, EvictionPolicy};
pub use error::{CacheError, CacheResult};
pub use manager::{QuerySubscription, SubscriptionManager};
pub use subscription::{Owner, Subscription, SubscriptionState};

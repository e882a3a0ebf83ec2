//! Foundation types for livecache.
//!
//! This crate provides the identity, value, and row-access types shared by the
//! store, the query layer, and the observable cache. Every other livecache
//! crate depends on `livecache-types`.
//!
//! # Key Types
//!
//! - [`ResourceId`] -- Hierarchical address of a store collection (`content://authority/table`)
//! - [`Value`] / [`Values`] -- Column values and column→value maps for mutations
//! - [`Filter`] / [`Order`] -- Typed selection and ordering, rendered canonically
//! - [`Query`] -- Resource + projection + filter + order + snapshot mode
//! - [`QueryKey`] -- Canonical identity of a logical query, the sole cache key
//! - [`RowSet`] / [`Row`] -- Raw query results with by-name and by-position access

pub mod error;
pub mod filter;
pub mod query;
pub mod resource;
pub mod row;
pub mod value;

pub use error::{ParseError, TypeError};
pub use filter::{Direction, Filter, Order};
pub use query::{Query, QueryKey, SnapshotMode};
pub use resource::ResourceId;
pub use row::{FromValue, Row, RowSet};
pub use value::{Value, Values};

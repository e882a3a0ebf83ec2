use std::fmt;
use std::sync::{Arc, OnceLock};

use livecache_types::{ParseError, RowSet, SnapshotMode};

use crate::parser::RowParser;

/// Immutable result of one query load.
///
/// A refresh never mutates a snapshot; it produces a new one.
pub enum Snapshot<R> {
    /// Every row parsed up front, in query order.
    Materialized(Vec<R>),
    /// Raw rows plus a parser; each index is parsed on first access.
    Indexed(IndexedRows<R>),
}

impl<R> Snapshot<R> {
    pub fn mode(&self) -> SnapshotMode {
        match self {
            Self::Materialized(_) => SnapshotMode::Materialized,
            Self::Indexed(_) => SnapshotMode::Indexed,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Materialized(records) => records.len(),
            Self::Indexed(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `index`, or `None` past the end. Only indexed snapshots can
    /// fail, when the row does not parse.
    pub fn get(&self, index: usize) -> Option<Result<&R, ParseError>> {
        match self {
            Self::Materialized(records) => records.get(index).map(Ok),
            Self::Indexed(rows) => rows.get(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&R, ParseError>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Fully realized records, when the snapshot is materialized.
    pub fn records(&self) -> Option<&[R]> {
        match self {
            Self::Materialized(records) => Some(records),
            Self::Indexed(_) => None,
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Snapshot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Materialized(records) => f.debug_tuple("Materialized").field(records).finish(),
            Self::Indexed(rows) => f.debug_tuple("Indexed").field(rows).finish(),
        }
    }
}

/// Lazily parsed view over a [`RowSet`].
///
/// Each index is parsed at most once; the outcome, success or failure, is
/// memoized. Concurrent readers of the same index wait for the first parse.
pub struct IndexedRows<R> {
    rows: Arc<RowSet>,
    parser: Arc<dyn RowParser<R>>,
    parsed: Box<[OnceLock<Result<R, ParseError>>]>,
}

impl<R> IndexedRows<R> {
    pub fn new(rows: Arc<RowSet>, parser: Arc<dyn RowParser<R>>) -> Self {
        let parsed = (0..rows.len()).map(|_| OnceLock::new()).collect();
        Self {
            rows,
            parser,
            parsed,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Result<&R, ParseError>> {
        let row = self.rows.row(index)?;
        let slot = self.parsed.get(index)?;
        Some(
            slot.get_or_init(|| self.parser.parse(&row))
                .as_ref()
                .map_err(Clone::clone),
        )
    }

    /// Number of indexes parsed so far.
    pub fn parsed_count(&self) -> usize {
        self.parsed.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// The raw rows backing this view.
    pub fn rows(&self) -> &RowSet {
        &self.rows
    }
}

impl<R> fmt::Debug for IndexedRows<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedRows")
            .field("len", &self.len())
            .field("parsed", &self.parsed_count())
            .finish()
    }
}

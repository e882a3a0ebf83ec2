//! In-memory implementation of the [`Store`] trait.
//!
//! [`InMemoryStore`] keeps every table behind one `RwLock`. It implements the
//! full [`Store`] contract, including unique-constraint conflict resolution,
//! row-level resources, and change notifications, and is the store the demo
//! host and the cache tests run against. Persistence lives in
//! [`crate::definition`].

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use livecache_types::{Filter, Order, ResourceId, RowSet, Value, Values};

use crate::error::{StoreError, StoreResult};
use crate::eval::{compare_rows, compile_optional, compile_order, row_matches, Predicate};
use crate::notify::{ChangeFilter, ChangeKind, ChangeRouter, ChangeStream};
use crate::schema::{ConflictPolicy, TableSchema, ID_COLUMN};
use crate::traits::{RecordId, Store};

/// One table: schema plus rows in insertion order.
///
/// Every stored row has one value per column in [`TableSchema::column_names`]
/// order, with the row id in position 0.
#[derive(Clone, Debug)]
pub(crate) struct Table {
    pub(crate) schema: TableSchema,
    pub(crate) rows: Vec<Vec<Value>>,
    pub(crate) next_id: i64,
}

impl Table {
    pub(crate) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    /// Validate and coerce a full row for insertion. The id slot is left null.
    fn prepare_insert(&self, values: &Values) -> StoreResult<Vec<Value>> {
        let schema = &self.schema;
        let mut row = vec![Value::Null; schema.columns().len() + 1];
        for (column, value) in values.iter() {
            let (pos, coerced) = self.coerce(column, value)?;
            row[pos] = coerced;
        }
        for (i, def) in schema.columns().iter().enumerate() {
            if def.not_null && row[i + 1].is_null() {
                return Err(schema.violation(format!("{} may not be null", def.name)));
            }
        }
        Ok(row)
    }

    /// Validate and coerce a patch into `(position, value)` assignments.
    fn prepare_patch(&self, patch: &Values) -> StoreResult<Vec<(usize, Value)>> {
        patch
            .iter()
            .map(|(column, value)| {
                let (pos, coerced) = self.coerce(column, value)?;
                if coerced.is_null() && self.schema.columns()[pos - 1].not_null {
                    return Err(self.schema.violation(format!("{column} may not be null")));
                }
                Ok((pos, coerced))
            })
            .collect()
    }

    fn coerce(&self, column: &str, value: &Value) -> StoreResult<(usize, Value)> {
        let schema = &self.schema;
        if column == ID_COLUMN {
            return Err(StoreError::MalformedQuery(format!(
                "{ID_COLUMN} is assigned by the store"
            )));
        }
        let def = schema
            .column(column)
            .ok_or_else(|| schema.unknown_column(column))?;
        let coerced = def.ty.coerce(value).ok_or_else(|| {
            schema.violation(format!(
                "{column} expects {}, got {}",
                def.ty,
                value.type_name()
            ))
        })?;
        let pos = schema
            .position(column)
            .ok_or_else(|| schema.unknown_column(column))?;
        Ok((pos, coerced))
    }

    /// Positions of every unique constraint, paired with its policy.
    fn unique_positions(&self) -> Vec<(Vec<usize>, ConflictPolicy)> {
        self.schema
            .unique_constraints()
            .iter()
            .map(|u| {
                let positions = u
                    .columns
                    .iter()
                    .filter_map(|c| self.schema.position(c))
                    .collect();
                (positions, u.on_conflict)
            })
            .collect()
    }

    /// Nulls never conflict.
    fn conflicts(positions: &[usize], a: &[Value], b: &[Value]) -> bool {
        positions.iter().all(|&i| {
            !a[i].is_null() && a[i].compare(&b[i]) == Some(std::cmp::Ordering::Equal)
        })
    }

    /// Insert a prepared row, resolving unique conflicts.
    fn insert_row(&mut self, mut row: Vec<Value>) -> StoreResult<RecordId> {
        let mut replaced = HashSet::new();
        for (positions, policy) in self.unique_positions() {
            for (i, existing) in self.rows.iter().enumerate() {
                if Self::conflicts(&positions, &row, existing) {
                    match policy {
                        ConflictPolicy::Abort => {
                            return Err(self.schema.violation(format!(
                                "duplicate value for unique {}",
                                self.constraint_label(&positions)
                            )))
                        }
                        ConflictPolicy::Replace => {
                            replaced.insert(i);
                        }
                    }
                }
            }
        }
        if !replaced.is_empty() {
            let mut i = 0;
            self.rows.retain(|_| {
                let keep = !replaced.contains(&i);
                i += 1;
                keep
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        row[0] = Value::Integer(id);
        self.rows.push(row);
        Ok(RecordId(id))
    }

    fn update_rows(
        &mut self,
        assignments: &[(usize, Value)],
        predicate: &Option<Predicate>,
    ) -> StoreResult<usize> {
        let matched: Vec<usize> = (0..self.rows.len())
            .filter(|&i| row_matches(predicate, &self.rows[i]))
            .collect();
        for &i in &matched {
            for (pos, value) in assignments {
                self.rows[i][*pos] = value.clone();
            }
        }

        let touched: HashSet<usize> = assignments.iter().map(|(p, _)| *p).collect();
        let mut removed = HashSet::new();
        for (positions, policy) in self.unique_positions() {
            if !positions.iter().any(|p| touched.contains(p)) {
                continue;
            }
            for &i in &matched {
                if removed.contains(&i) {
                    continue;
                }
                for j in 0..self.rows.len() {
                    if j == i || removed.contains(&j) {
                        continue;
                    }
                    if Self::conflicts(&positions, &self.rows[i], &self.rows[j]) {
                        if policy == ConflictPolicy::Abort {
                            return Err(self.schema.violation(format!(
                                "duplicate value for unique {}",
                                self.constraint_label(&positions)
                            )));
                        }
                        removed.insert(j);
                    }
                }
            }
        }
        if !removed.is_empty() {
            let mut i = 0;
            self.rows.retain(|_| {
                let keep = !removed.contains(&i);
                i += 1;
                keep
            });
        }
        Ok(matched.len())
    }

    fn delete_rows(&mut self, predicate: &Option<Predicate>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row_matches(predicate, row));
        before - self.rows.len()
    }

    fn constraint_label(&self, positions: &[usize]) -> String {
        let names = self.schema.column_names();
        positions
            .iter()
            .map(|&p| names[p].as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Everything behind the store lock.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) tables: BTreeMap<String, Table>,
}

impl State {
    /// Resolve a resource to its table name and, for row-level resources
    /// (`<table resource>/<id>`), the addressed row id.
    fn resolve(&self, resource: &ResourceId) -> StoreResult<(String, Option<i64>)> {
        for (name, table) in &self.tables {
            let base = table.schema.resource();
            if base == resource {
                return Ok((name.clone(), None));
            }
            if let Some(rest) = resource
                .as_str()
                .strip_prefix(base.as_str())
                .and_then(|r| r.strip_prefix('/'))
            {
                if let Ok(id) = rest.parse::<i64>() {
                    return Ok((name.clone(), Some(id)));
                }
            }
        }
        Err(StoreError::UnknownResource(resource.clone()))
    }

    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::Unavailable(format!("table {name} vanished")))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::Unavailable(format!("table {name} vanished")))
    }
}

/// Narrow a filter to one row when the resource addresses a single row.
fn scoped_filter(row_id: Option<i64>, filter: Option<&Filter>) -> Option<Filter> {
    match (row_id, filter) {
        (Some(id), Some(f)) => Some(Filter::eq(ID_COLUMN, id).and(f.clone())),
        (Some(id), None) => Some(Filter::eq(ID_COLUMN, id)),
        (None, f) => f.cloned(),
    }
}

/// In-memory, table-based record store.
///
/// Intended for tests, the demo host, and embedding. All tables live behind
/// one `RwLock`; readers run concurrently and a mutation holds the write lock
/// only while it applies. Change notifications are emitted after the lock is
/// released.
pub struct InMemoryStore {
    state: RwLock<State>,
    router: ChangeRouter,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store with no tables.
    pub fn new() -> Self {
        Self::with_capacity(ChangeRouter::DEFAULT_CAPACITY)
    }

    /// Create an empty store whose change streams buffer `capacity`
    /// notifications per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_state(State::default(), capacity)
    }

    pub(crate) fn from_state(state: State, capacity: usize) -> Self {
        Self {
            state: RwLock::new(state),
            router: ChangeRouter::new(capacity),
            available: AtomicBool::new(true),
        }
    }

    /// Register a table.
    pub fn create_table(&self, schema: TableSchema) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.tables.contains_key(schema.name())
            || state
                .tables
                .values()
                .any(|t| t.schema.resource() == schema.resource())
        {
            return Err(StoreError::TableExists(schema.name().to_string()));
        }
        debug!(table = schema.name(), resource = %schema.resource(), "table created");
        state
            .tables
            .insert(schema.name().to_string(), Table::new(schema));
        Ok(())
    }

    /// Remove a table and its rows. Returns `true` if it existed.
    pub fn drop_table(&self, name: &str) -> StoreResult<bool> {
        let mut state = self.write()?;
        let existed = state.tables.remove(name).is_some();
        if existed {
            debug!(table = name, "table dropped");
        }
        Ok(existed)
    }

    /// Names of every registered table.
    pub fn table_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.tables.keys().cloned().collect())
    }

    pub fn schema(&self, name: &str) -> StoreResult<Option<TableSchema>> {
        Ok(self.read()?.tables.get(name).map(|t| t.schema.clone()))
    }

    /// Live rows addressed by a resource.
    pub fn row_count(&self, resource: &ResourceId) -> StoreResult<usize> {
        let state = self.read()?;
        let (name, row_id) = state.resolve(resource)?;
        let table = state.table(&name)?;
        Ok(match row_id {
            Some(id) => table
                .rows
                .iter()
                .filter(|r| r[0] == Value::Integer(id))
                .count(),
            None => table.rows.len(),
        })
    }

    /// Simulate the medium becoming reachable or unreachable. While
    /// unavailable every operation fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        debug!(available, "store availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Definition name this store was created or opened with.
    pub fn definition_name(&self) -> StoreResult<String> {
        Ok(self.read()?.name.clone())
    }

    /// Definition version this store was created or opened with.
    pub fn version(&self) -> StoreResult<u32> {
        Ok(self.read()?.version)
    }

    pub fn change_subscriber_count(&self) -> usize {
        self.router.subscriber_count()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".into()))
        }
    }

    pub(crate) fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    pub(crate) fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn notify(&self, resource: &ResourceId, kind: ChangeKind, affected: usize) {
        let change = self.router.notify(resource.clone(), kind, affected);
        debug!(seq = change.seq, resource = %resource, kind = %kind, affected, "change notified");
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("available", &self.is_available())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Store for InMemoryStore {
    fn query(
        &self,
        resource: &ResourceId,
        projection: Option<&[String]>,
        filter: Option<&Filter>,
        order: &[Order],
    ) -> StoreResult<RowSet> {
        let state = self.read()?;
        let (name, row_id) = state.resolve(resource)?;
        let table = state.table(&name)?;
        let schema = &table.schema;

        let columns: Vec<String> = match projection {
            Some(cols) => cols.to_vec(),
            None => schema.column_names(),
        };
        let positions = columns
            .iter()
            .map(|c| schema.position(c).ok_or_else(|| schema.unknown_column(c)))
            .collect::<StoreResult<Vec<_>>>()?;
        let scoped = scoped_filter(row_id, filter);
        let predicate = compile_optional(schema, scoped.as_ref())?;
        let order = compile_order(schema, order)?;

        let mut matched: Vec<&Vec<Value>> = table
            .rows
            .iter()
            .filter(|row| row_matches(&predicate, row))
            .collect();
        if !order.is_empty() {
            matched.sort_by(|a, b| compare_rows(&order, a, b));
        }
        let rows = matched
            .into_iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    fn insert(&self, resource: &ResourceId, values: &Values) -> StoreResult<RecordId> {
        let id = {
            let mut state = self.write()?;
            let (name, row_id) = state.resolve(resource)?;
            if row_id.is_some() {
                return Err(StoreError::MalformedQuery(format!(
                    "cannot insert into row resource {resource}"
                )));
            }
            let table = state.table_mut(&name)?;
            let row = table.prepare_insert(values)?;
            table.insert_row(row)?
        };
        debug!(resource = %resource, id = id.0, "row inserted");
        self.notify(resource, ChangeKind::Insert, 1);
        Ok(id)
    }

    fn bulk_insert(&self, resource: &ResourceId, rows: &[Values]) -> StoreResult<usize> {
        {
            let mut state = self.write()?;
            let (name, row_id) = state.resolve(resource)?;
            if row_id.is_some() {
                return Err(StoreError::MalformedQuery(format!(
                    "cannot insert into row resource {resource}"
                )));
            }
            let table = state.table_mut(&name)?;
            let prepared = rows
                .iter()
                .map(|values| table.prepare_insert(values))
                .collect::<StoreResult<Vec<_>>>()?;
            let mut staged = table.clone();
            for row in prepared {
                staged.insert_row(row)?;
            }
            *table = staged;
        }
        debug!(resource = %resource, rows = rows.len(), "bulk insert applied");
        self.notify(resource, ChangeKind::Insert, rows.len());
        Ok(rows.len())
    }

    fn update(
        &self,
        resource: &ResourceId,
        patch: &Values,
        filter: Option<&Filter>,
    ) -> StoreResult<usize> {
        let affected = {
            let mut state = self.write()?;
            let (name, row_id) = state.resolve(resource)?;
            let table = state.table_mut(&name)?;
            let assignments = table.prepare_patch(patch)?;
            let scoped = scoped_filter(row_id, filter);
            let predicate = compile_optional(&table.schema, scoped.as_ref())?;
            let mut staged = table.clone();
            let affected = staged.update_rows(&assignments, &predicate)?;
            *table = staged;
            affected
        };
        debug!(resource = %resource, affected, "rows updated");
        self.notify(resource, ChangeKind::Update, affected);
        Ok(affected)
    }

    fn delete(&self, resource: &ResourceId, filter: Option<&Filter>) -> StoreResult<usize> {
        let affected = {
            let mut state = self.write()?;
            let (name, row_id) = state.resolve(resource)?;
            let table = state.table_mut(&name)?;
            let scoped = scoped_filter(row_id, filter);
            let predicate = compile_optional(&table.schema, scoped.as_ref())?;
            table.delete_rows(&predicate)
        };
        debug!(resource = %resource, affected, "rows deleted");
        self.notify(resource, ChangeKind::Delete, affected);
        Ok(affected)
    }

    fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeStream {
        self.router.subscribe(filter)
    }
}

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use livecache_types::{ResourceId, Value};

use crate::error::{StoreError, StoreResult};

/// Name of the implicit auto-increment row id column present in every table.
pub const ID_COLUMN: &str = "_id";

/// Storage type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Coerce a value into this column type, or `None` if it does not fit.
    /// Null passes through; integers widen into real columns.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (Self::Integer, Value::Integer(_))
            | (Self::Real, Value::Real(_))
            | (Self::Text, Value::Text(_)) => Some(value.clone()),
            (Self::Real, Value::Integer(i)) => Some(Value::Real(*i as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}

/// One declared column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            not_null: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// What an insert does when it collides with a unique constraint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Delete the conflicting row, then insert (last write wins).
    #[default]
    Replace,
    /// Reject the insert with a constraint violation.
    Abort,
}

/// A uniqueness constraint over one or more columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub columns: Vec<String>,
    pub on_conflict: ConflictPolicy,
}

/// Validated description of one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    resource: ResourceId,
    columns: Vec<ColumnDef>,
    unique: Vec<UniqueConstraint>,
}

impl TableSchema {
    pub fn builder(name: impl Into<String>, resource: ResourceId) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.into(),
            resource,
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Declared columns, excluding `_id`.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique
    }

    /// Every column name in row order: `_id` first, then declared columns.
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(ID_COLUMN.to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// Position of a column in stored rows (`_id` is 0).
    pub fn position(&self, column: &str) -> Option<usize> {
        if column == ID_COLUMN {
            return Some(0);
        }
        self.columns
            .iter()
            .position(|c| c.name == column)
            .map(|i| i + 1)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Re-run the builder's checks, for schemas that did not come from
    /// [`TableSchemaBuilder::build`] (e.g. deserialized images).
    pub fn validate(self) -> StoreResult<TableSchema> {
        TableSchemaBuilder {
            name: self.name,
            resource: self.resource,
            columns: self.columns,
            unique: self.unique,
        }
        .build()
    }

    pub(crate) fn unknown_column(&self, column: &str) -> StoreError {
        StoreError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        }
    }

    pub(crate) fn violation(&self, reason: impl Into<String>) -> StoreError {
        StoreError::ConstraintViolation {
            table: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Builder for [`TableSchema`]; validation happens in [`build`](Self::build).
#[derive(Debug)]
pub struct TableSchemaBuilder {
    name: String,
    resource: ResourceId,
    columns: Vec<ColumnDef>,
    unique: Vec<UniqueConstraint>,
}

impl TableSchemaBuilder {
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
        on_conflict: ConflictPolicy,
    ) -> Self {
        self.unique.push(UniqueConstraint {
            columns: columns.into_iter().map(Into::into).collect(),
            on_conflict,
        });
        self
    }

    pub fn build(self) -> StoreResult<TableSchema> {
        let invalid = |reason: String| StoreError::InvalidSchema {
            table: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("table name is empty".into()));
        }
        if self.columns.is_empty() {
            return Err(invalid("no columns declared".into()));
        }
        let mut seen = HashSet::new();
        for col in &self.columns {
            if col.name.is_empty() {
                return Err(invalid("empty column name".into()));
            }
            if col.name == ID_COLUMN {
                return Err(invalid(format!("{ID_COLUMN} is reserved")));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(invalid(format!("duplicate column {}", col.name)));
            }
        }
        for constraint in &self.unique {
            if constraint.columns.is_empty() {
                return Err(invalid("unique constraint with no columns".into()));
            }
            if let Some(missing) = constraint.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(invalid(format!("unique constraint names unknown column {missing}")));
            }
        }

        Ok(TableSchema {
            name: self.name,
            resource: self.resource,
            columns: self.columns,
            unique: self.unique,
        })
    }
}

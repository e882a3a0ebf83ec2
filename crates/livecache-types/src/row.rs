use std::sync::Arc;

use crate::error::ParseError;
use crate::value::Value;

/// Raw rows returned by a store query.
///
/// Immutable once built. Column names are shared between all rows; each row
/// holds one value per column, in column order.
#[derive(Clone, Debug, PartialEq)]
pub struct RowSet {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Build a row set. Every row must have exactly one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self {
            columns: columns.into(),
            rows,
        }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            index,
            columns: &self.columns,
            values,
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Row<'_>> + '_ {
        self.rows.iter().enumerate().map(|(index, values)| Row {
            index,
            columns: &self.columns,
            values,
        })
    }
}

/// Borrowed view of one row, with access by column name or position.
#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    index: usize,
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Position of this row within its row set.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Raw value by column name.
    pub fn value(&self, column: &str) -> Result<&'a Value, ParseError> {
        self.column_index(column)
            .map(|i| &self.values[i])
            .ok_or_else(|| ParseError::MissingColumn {
                column: column.to_string(),
            })
    }

    /// Raw value by position.
    pub fn value_at(&self, index: usize) -> Result<&'a Value, ParseError> {
        self.values.get(index).ok_or(ParseError::ColumnOutOfRange {
            index,
            width: self.values.len(),
        })
    }

    /// Typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, ParseError> {
        T::from_value(self.value(column)?).map_err(|found| ParseError::TypeMismatch {
            column: column.to_string(),
            expected: T::EXPECTED,
            found,
        })
    }

    /// Typed value by position.
    pub fn get_at<T: FromValue>(&self, index: usize) -> Result<T, ParseError> {
        T::from_value(self.value_at(index)?).map_err(|found| ParseError::TypeMismatch {
            column: self.columns[index].clone(),
            expected: T::EXPECTED,
            found,
        })
    }
}

/// Conversion from a column value into a Rust type.
///
/// On mismatch, implementations return the found value's type name.
pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Result<Self, &'static str>;
}

impl FromValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_str().map(str::to_string).ok_or(value.type_name())
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_i64().ok_or(value.type_name())
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "real";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_f64().ok_or(value.type_name())
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        value.as_i64().map(|i| i != 0).ok_or(value.type_name())
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value) -> Result<Self, &'static str> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("resource identifier must not be empty")]
    EmptyResource,

    #[error("invalid resource identifier {0:?}: {1}")]
    InvalidResource(String, &'static str),

    #[error("query key must not be empty")]
    EmptyKey,
}

/// A row could not be decoded into a typed record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The row has no column with this name.
    #[error("missing column: {column}")]
    MissingColumn { column: String },

    /// Positional access past the end of the row.
    #[error("column index {index} out of range (row has {width} columns)")]
    ColumnOutOfRange { index: usize, width: usize },

    /// The column holds a value of a different type.
    #[error("column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Application-level rejection from a row parser.
    #[error("invalid row: {0}")]
    Invalid(String),
}

impl ParseError {
    /// Convenience constructor for parser-defined failures.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

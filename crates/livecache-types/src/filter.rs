use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Typed row selection.
///
/// Filters are data, never query text: the store evaluates them directly and
/// [`Filter::canonical`] gives logically equal filters one rendering, which
/// is what makes [`crate::QueryKey`] stable across spellings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
    StartsWith(String, String),
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(column.into(), value.into())
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Le(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(column.into(), value.into())
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ge(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn starts_with(column: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::StartsWith(column.into(), prefix.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn and(self, other: Filter) -> Self {
        Self::And(vec![self, other])
    }

    pub fn or(self, other: Filter) -> Self {
        Self::Or(vec![self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Every column the filter references, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Eq(c, _)
            | Self::Ne(c, _)
            | Self::Lt(c, _)
            | Self::Le(c, _)
            | Self::Gt(c, _)
            | Self::Ge(c, _)
            | Self::In(c, _)
            | Self::StartsWith(c, _)
            | Self::IsNull(c) => {
                if !out.contains(&c.as_str()) {
                    out.push(c);
                }
            }
            Self::And(fs) | Self::Or(fs) => fs.iter().for_each(|f| f.collect_columns(out)),
            Self::Not(f) => f.collect_columns(out),
        }
    }

    /// Normal form: nested `And`/`Or` flattened, their operands and `In`
    /// lists sorted and deduplicated, single-operand groups unwrapped, and
    /// double negation removed.
    pub fn canonical(&self) -> Filter {
        match self {
            Self::And(fs) => Self::canonical_group(fs, true),
            Self::Or(fs) => Self::canonical_group(fs, false),
            Self::Not(inner) => match inner.canonical() {
                Self::Not(f) => *f,
                f => Self::Not(Box::new(f)),
            },
            Self::In(c, values) => {
                let mut values = values.clone();
                values.sort_by_key(Value::literal);
                values.dedup_by(|a, b| a.literal() == b.literal());
                Self::In(c.clone(), values)
            }
            other => other.clone(),
        }
    }

    fn canonical_group(operands: &[Filter], conjunction: bool) -> Filter {
        let mut flat = Vec::with_capacity(operands.len());
        for f in operands.iter().map(Filter::canonical) {
            match (f, conjunction) {
                (Self::And(inner), true) | (Self::Or(inner), false) => flat.extend(inner),
                (f, _) => flat.push(f),
            }
        }
        flat.sort_by_cached_key(ToString::to_string);
        flat.dedup_by(|a, b| a.to_string() == b.to_string());
        if flat.len() == 1 {
            return flat.remove(0);
        }
        if conjunction {
            Self::And(flat)
        } else {
            Self::Or(flat)
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, fs: &[Filter], op: &str) -> fmt::Result {
            if fs.is_empty() {
                // Empty AND is vacuously true, empty OR is false.
                return f.write_str(if op == " AND " { "TRUE" } else { "FALSE" });
            }
            f.write_str("(")?;
            for (i, item) in fs.iter().enumerate() {
                if i > 0 {
                    f.write_str(op)?;
                }
                write!(f, "{item}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::Eq(c, v) => write!(f, "{c} = {v}"),
            Self::Ne(c, v) => write!(f, "{c} <> {v}"),
            Self::Lt(c, v) => write!(f, "{c} < {v}"),
            Self::Le(c, v) => write!(f, "{c} <= {v}"),
            Self::Gt(c, v) => write!(f, "{c} > {v}"),
            Self::Ge(c, v) => write!(f, "{c} >= {v}"),
            Self::In(c, vs) => {
                write!(f, "{c} IN (")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(")")
            }
            Self::StartsWith(c, p) => write!(f, "{c} STARTS WITH {}", Value::from(p.as_str())),
            Self::IsNull(c) => write!(f, "{c} IS NULL"),
            Self::And(fs) => join(f, fs, " AND "),
            Self::Or(fs) => join(f, fs, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

/// Sort direction for one ordering term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term: column plus direction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        write!(f, "{} {dir}", self.column)
    }
}

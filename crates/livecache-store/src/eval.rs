use std::cmp::Ordering;

use livecache_types::{Direction, Filter, Order, Value};

use crate::error::StoreResult;
use crate::schema::TableSchema;

/// A filter with column names resolved to row positions.
///
/// Comparisons against null, or between text and numbers, are false. `Not`
/// negates its operand's boolean result (two-valued logic).
#[derive(Debug)]
pub(crate) enum Predicate {
    Cmp(usize, CmpOp, Value),
    In(usize, Vec<Value>),
    StartsWith(usize, String),
    IsNull(usize),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn test(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

impl Predicate {
    /// Resolve every column in `filter` against `schema`.
    pub(crate) fn compile(schema: &TableSchema, filter: &Filter) -> StoreResult<Self> {
        let pos = |column: &str| schema.position(column).ok_or_else(|| schema.unknown_column(column));
        let cmp = |column: &str, op: CmpOp, value: &Value| -> StoreResult<Self> {
            Ok(Self::Cmp(pos(column)?, op, value.clone()))
        };

        match filter {
            Filter::Eq(c, v) => cmp(c, CmpOp::Eq, v),
            Filter::Ne(c, v) => cmp(c, CmpOp::Ne, v),
            Filter::Lt(c, v) => cmp(c, CmpOp::Lt, v),
            Filter::Le(c, v) => cmp(c, CmpOp::Le, v),
            Filter::Gt(c, v) => cmp(c, CmpOp::Gt, v),
            Filter::Ge(c, v) => cmp(c, CmpOp::Ge, v),
            Filter::In(c, vs) => Ok(Self::In(pos(c)?, vs.clone())),
            Filter::StartsWith(c, p) => Ok(Self::StartsWith(pos(c)?, p.clone())),
            Filter::IsNull(c) => Ok(Self::IsNull(pos(c)?)),
            Filter::And(fs) => fs
                .iter()
                .map(|f| Self::compile(schema, f))
                .collect::<StoreResult<_>>()
                .map(Self::And),
            Filter::Or(fs) => fs
                .iter()
                .map(|f| Self::compile(schema, f))
                .collect::<StoreResult<_>>()
                .map(Self::Or),
            Filter::Not(f) => Ok(Self::Not(Box::new(Self::compile(schema, f)?))),
        }
    }

    pub(crate) fn matches(&self, row: &[Value]) -> bool {
        match self {
            Self::Cmp(i, op, v) => row[*i].compare(v).is_some_and(|ord| op.test(ord)),
            Self::In(i, vs) => vs
                .iter()
                .any(|v| row[*i].compare(v) == Some(Ordering::Equal)),
            Self::StartsWith(i, prefix) => row[*i].as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
            Self::IsNull(i) => row[*i].is_null(),
            Self::And(ps) => ps.iter().all(|p| p.matches(row)),
            Self::Or(ps) => ps.iter().any(|p| p.matches(row)),
            Self::Not(p) => !p.matches(row),
        }
    }
}

/// Matches every row when no filter is given.
pub(crate) fn compile_optional(
    schema: &TableSchema,
    filter: Option<&Filter>,
) -> StoreResult<Option<Predicate>> {
    filter.map(|f| Predicate::compile(schema, f)).transpose()
}

pub(crate) fn row_matches(predicate: &Option<Predicate>, row: &[Value]) -> bool {
    predicate.as_ref().map_or(true, |p| p.matches(row))
}

/// Resolve ordering terms to `(position, direction)` pairs.
pub(crate) fn compile_order(
    schema: &TableSchema,
    order: &[Order],
) -> StoreResult<Vec<(usize, Direction)>> {
    order
        .iter()
        .map(|o| {
            schema
                .position(&o.column)
                .map(|i| (i, o.direction))
                .ok_or_else(|| schema.unknown_column(&o.column))
        })
        .collect()
}

/// Compare two rows by the resolved ordering; ties keep insertion order
/// because callers use a stable sort.
pub(crate) fn compare_rows(order: &[(usize, Direction)], a: &[Value], b: &[Value]) -> Ordering {
    for &(i, dir) in order {
        let ord = a[i].sort_cmp(&b[i]);
        let ord = match dir {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, TableSchema};
    use livecache_types::ResourceId;

    fn schema() -> TableSchema {
        TableSchema::builder("t", ResourceId::new("content://t/t"))
            .column(ColumnDef::text("path"))
            .column(ColumnDef::integer("size"))
            .build()
            .unwrap()
    }

    fn row(id: i64, path: Option<&str>, size: i64) -> Vec<Value> {
        vec![Value::from(id), Value::from(path), Value::from(size)]
    }

    fn eval(filter: Filter, row: &[Value]) -> bool {
        Predicate::compile(&schema(), &filter).unwrap().matches(row)
    }

    #[test]
    fn comparisons() {
        let r = row(1, Some("/sdcard/a"), 10);
        assert!(eval(Filter::eq("size", 10), &r));
        assert!(eval(Filter::eq("size", 10.0), &r));
        assert!(eval(Filter::ge("size", 10), &r));
        assert!(!eval(Filter::gt("size", 10), &r));
        assert!(eval(Filter::ne("path", "/x"), &r));
        assert!(eval(Filter::starts_with("path", "/sdcard"), &r));
        assert!(eval(Filter::is_in("_id", [3, 1]), &r));
    }

    #[test]
    fn null_never_compares() {
        let r = row(1, None, 0);
        assert!(!eval(Filter::eq("path", "/a"), &r));
        assert!(!eval(Filter::ne("path", "/a"), &r));
        assert!(eval(Filter::is_null("path"), &r));
        assert!(!eval(Filter::starts_with("path", ""), &r));
    }

    #[test]
    fn text_and_numbers_do_not_compare() {
        let r = row(1, Some("10"), 10);
        assert!(!eval(Filter::eq("path", 10), &r));
        assert!(!eval(Filter::eq("size", "10"), &r));
    }

    #[test]
    fn boolean_combinators() {
        let r = row(1, Some("/a"), 5);
        assert!(eval(Filter::eq("size", 5).and(Filter::eq("path", "/a")), &r));
        assert!(eval(Filter::eq("size", 6).or(Filter::eq("path", "/a")), &r));
        assert!(eval(Filter::eq("size", 6).not(), &r));
        assert!(eval(Filter::And(vec![]), &r));
        assert!(!eval(Filter::Or(vec![]), &r));
    }

    #[test]
    fn unknown_columns_fail_to_compile() {
        let err = Predicate::compile(&schema(), &Filter::eq("a", 1).or(Filter::eq("nope", 1)))
            .unwrap_err();
        assert!(err.is_malformed());
        assert!(compile_order(&schema(), &[Order::asc("nope")]).is_err());
    }

    #[test]
    fn ordering_puts_nulls_first_and_respects_direction() {
        let order = compile_order(&schema(), &[Order::desc("size"), Order::asc("path")]).unwrap();
        let a = row(1, Some("/b"), 1);
        let b = row(2, Some("/a"), 1);
        let c = row(3, None, 2);
        assert_eq!(compare_rows(&order, &c, &a), Ordering::Less);
        assert_eq!(compare_rows(&order, &b, &a), Ordering::Less);

        let asc = compile_order(&schema(), &[Order::asc("path")]).unwrap();
        assert_eq!(compare_rows(&asc, &c, &b), Ordering::Less);
    }
}

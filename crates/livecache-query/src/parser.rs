use std::fmt;
use std::marker::PhantomData;

use livecache_types::{ParseError, Row};

/// Converts one raw row into a typed record.
///
/// Parsers are pure: the same row always yields the same result. Any
/// `Fn(&Row) -> Result<R, ParseError>` closure is a parser.
pub trait RowParser<R>: Send + Sync {
    fn parse(&self, row: &Row<'_>) -> Result<R, ParseError>;
}

impl<R, F> RowParser<R> for F
where
    F: Fn(&Row<'_>) -> Result<R, ParseError> + Send + Sync,
{
    fn parse(&self, row: &Row<'_>) -> Result<R, ParseError> {
        self(row)
    }
}

/// Record types that know how to read themselves from a row.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> Result<Self, ParseError>;
}

/// [`RowParser`] for any [`FromRow`] type.
pub struct FromRowParser<R>(PhantomData<fn() -> R>);

impl<R> FromRowParser<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for FromRowParser<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for FromRowParser<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FromRowParser<{}>", std::any::type_name::<R>())
    }
}

impl<R: FromRow> RowParser<R> for FromRowParser<R> {
    fn parse(&self, row: &Row<'_>) -> Result<R, ParseError> {
        R::from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecache_types::{RowSet, Value};

    #[derive(Debug, PartialEq)]
    struct LocalFile {
        path: String,
        name: String,
    }

    impl FromRow for LocalFile {
        fn from_row(row: &Row<'_>) -> Result<Self, ParseError> {
            Ok(Self {
                path: row.get("path")?,
                name: row.get("name")?,
            })
        }
    }

    fn rows() -> RowSet {
        RowSet::new(
            vec!["path".into(), "name".into()],
            vec![vec![Value::from("/a"), Value::from("a")]],
        )
    }

    #[test]
    fn closures_are_parsers() {
        let parser = |row: &Row<'_>| row.get::<String>("path");
        let rows = rows();
        assert_eq!(parser.parse(&rows.row(0).unwrap()).unwrap(), "/a");
    }

    #[test]
    fn from_row_parser() {
        let rows = rows();
        let parsed = FromRowParser::<LocalFile>::new()
            .parse(&rows.row(0).unwrap())
            .unwrap();
        assert_eq!(
            parsed,
            LocalFile {
                path: "/a".into(),
                name: "a".into()
            }
        );
    }
}

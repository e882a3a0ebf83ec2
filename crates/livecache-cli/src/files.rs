use livecache_query::FromRow;
use livecache_store::{
    ColumnDef, ConflictPolicy, InMemoryStore, StoreDefinition, StoreResult, TableSchema, ID_COLUMN,
};
use livecache_types::{ParseError, ResourceId, Row, Values};

/// Resource of the demo's file table.
pub fn cloudfile() -> ResourceId {
    ResourceId::new("content://files.demo/cloudfile")
}

/// A file record as the demo displays it.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalFile {
    pub id: i64,
    pub path: String,
    pub name: String,
}

impl LocalFile {
    pub fn values(path: impl Into<String>, name: impl Into<String>) -> Values {
        Values::new().with("path", path.into()).with("name", name.into())
    }
}

impl FromRow for LocalFile {
    fn from_row(row: &Row<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            id: row.get(ID_COLUMN)?,
            path: row.get("path")?,
            name: row.get("name")?,
        })
    }
}

/// Version 1: one `cloudfile` table keyed by a unique path. Inserting an
/// existing path replaces the record.
pub struct FileDefinition;

impl StoreDefinition for FileDefinition {
    fn name(&self) -> &str {
        "files.demo"
    }

    fn version(&self) -> u32 {
        1
    }

    fn create(&self, store: &InMemoryStore) -> StoreResult<()> {
        let schema = TableSchema::builder("cloudfile", cloudfile())
            .column(ColumnDef::text("path").not_null())
            .column(ColumnDef::text("name"))
            .unique(["path"], ConflictPolicy::Replace)
            .build()?;
        store.create_table(schema)
    }
}

//! Versioned store definitions and JSON persistence for [`InMemoryStore`].
//!
//! A [`StoreDefinition`] names a store, declares its schema version, and
//! knows how to create the tables on a fresh store and how to migrate an
//! older image. [`InMemoryStore::open`] loads an image written by
//! [`InMemoryStore::save`], running `create` or `upgrade` as needed.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use livecache_types::{ResourceId, Value};

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryStore, State, Table};
use crate::notify::ChangeRouter;
use crate::schema::TableSchema;

/// Names a store, its schema version, and how to build or migrate it.
pub trait StoreDefinition: Send + Sync {
    fn name(&self) -> &str;

    /// Current schema version. Images with an older version are upgraded.
    fn version(&self) -> u32;

    /// Create every table on a fresh store.
    fn create(&self, store: &InMemoryStore) -> StoreResult<()>;

    /// Migrate a store loaded at version `old` to version `new`.
    ///
    /// Default implementation drops every table and recreates the schema,
    /// discarding existing rows.
    fn upgrade(&self, store: &InMemoryStore, old: u32, new: u32) -> StoreResult<()> {
        debug!(store = self.name(), old, new, "recreating tables for upgrade");
        for table in store.table_names()? {
            store.drop_table(&table)?;
        }
        self.create(store)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreImage {
    name: String,
    version: u32,
    tables: Vec<TableImage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableImage {
    schema: TableSchema,
    next_id: i64,
    rows: Vec<Vec<Value>>,
}

impl InMemoryStore {
    /// Create a fresh store for `definition`.
    pub fn create(definition: &dyn StoreDefinition) -> StoreResult<Self> {
        Self::create_with_capacity(definition, ChangeRouter::DEFAULT_CAPACITY)
    }

    pub fn create_with_capacity(
        definition: &dyn StoreDefinition,
        capacity: usize,
    ) -> StoreResult<Self> {
        let state = State {
            name: definition.name().to_string(),
            version: definition.version(),
            ..State::default()
        };
        let store = Self::from_state(state, capacity);
        definition.create(&store)?;
        info!(store = definition.name(), version = definition.version(), "store created");
        Ok(store)
    }

    /// Open the image at `path`, or create a fresh store if none exists.
    pub fn open(path: &Path, definition: &dyn StoreDefinition) -> StoreResult<Self> {
        Self::open_with_capacity(path, definition, ChangeRouter::DEFAULT_CAPACITY)
    }

    pub fn open_with_capacity(
        path: &Path,
        definition: &dyn StoreDefinition,
        capacity: usize,
    ) -> StoreResult<Self> {
        if !path.exists() {
            return Self::create_with_capacity(definition, capacity);
        }

        let bytes = fs::read(path)?;
        let image: StoreImage =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if image.name != definition.name() {
            return Err(StoreError::DefinitionMismatch {
                expected: definition.name().to_string(),
                found: image.name,
            });
        }
        if image.version > definition.version() {
            return Err(StoreError::VersionMismatch {
                found: image.version,
                expected: definition.version(),
            });
        }

        let old = image.version;
        let store = Self::from_state(restore(image)?, capacity);
        if old < definition.version() {
            definition.upgrade(&store, old, definition.version())?;
            store.write()?.version = definition.version();
            info!(store = definition.name(), old, new = definition.version(), "store upgraded");
        }
        debug!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// Write the store image to `path` atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let image = {
            let state = self.read()?;
            StoreImage {
                name: state.name.clone(),
                version: state.version,
                tables: state
                    .tables
                    .values()
                    .map(|t| TableImage {
                        schema: t.schema.clone(),
                        next_id: t.next_id,
                        rows: t.rows.clone(),
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_vec_pretty(&image)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %path.display(), bytes = json.len(), "store saved");
        Ok(())
    }
}

fn restore(image: StoreImage) -> StoreResult<State> {
    let mut tables: BTreeMap<String, Table> = BTreeMap::new();
    let mut resources: HashSet<ResourceId> = HashSet::new();
    for t in image.tables {
        let schema = t.schema.validate()?;
        let corrupt = |reason: String| {
            StoreError::Serialization(format!("table {}: {reason}", schema.name()))
        };
        if tables.contains_key(schema.name()) {
            return Err(corrupt("declared twice".into()));
        }
        if !resources.insert(schema.resource().clone()) {
            return Err(corrupt(format!("resource {} already in use", schema.resource())));
        }

        let width = schema.columns().len() + 1;
        let mut max_id: i64 = 0;
        for row in &t.rows {
            if row.len() != width {
                return Err(corrupt(format!(
                    "row has {} values, expected {width}",
                    row.len()
                )));
            }
            match row[0] {
                Value::Integer(id) => max_id = max_id.max(id),
                ref other => {
                    return Err(corrupt(format!("row id is {}", other.type_name())));
                }
            }
        }
        if t.next_id <= max_id {
            return Err(corrupt(format!(
                "next id {} does not exceed existing id {max_id}",
                t.next_id
            )));
        }

        let name = schema.name().to_string();
        let mut table = Table::new(schema);
        table.rows = t.rows;
        table.next_id = t.next_id;
        tables.insert(name, table);
    }
    Ok(State {
        name: image.name,
        version: image.version,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ConflictPolicy};
    use crate::traits::Store;
    use livecache_types::{ResourceId, Values};

    struct Files {
        version: u32,
    }

    fn files() -> ResourceId {
        ResourceId::new("content://files.demo/cloudfile")
    }

    impl StoreDefinition for Files {
        fn name(&self) -> &str {
            "files.db"
        }

        fn version(&self) -> u32 {
            self.version
        }

        fn create(&self, store: &InMemoryStore) -> StoreResult<()> {
            let mut builder = TableSchema::builder("cloudfile", files())
                .column(ColumnDef::text("path").not_null())
                .column(ColumnDef::text("name"));
            if self.version >= 2 {
                builder = builder.column(ColumnDef::integer("size"));
            }
            store.create_table(builder.unique(["path"], ConflictPolicy::Replace).build()?)
        }
    }

    #[test]
    fn create_runs_definition() {
        let store = InMemoryStore::create(&Files { version: 1 }).unwrap();
        assert_eq!(store.table_names().unwrap(), vec!["cloudfile"]);
        assert_eq!(store.version().unwrap(), 1);
        assert_eq!(store.definition_name().unwrap(), "files.db");
    }

    #[test]
    fn save_and_reopen_preserves_rows_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        let def = Files { version: 1 };

        let store = InMemoryStore::open(&path, &def).unwrap();
        store
            .insert(&files(), &Values::new().with("path", "/a").with("name", "a"))
            .unwrap();
        store
            .insert(&files(), &Values::new().with("path", "/b").with("name", "b"))
            .unwrap();
        store.save(&path).unwrap();

        let reopened = InMemoryStore::open(&path, &def).unwrap();
        assert_eq!(reopened.row_count(&files()).unwrap(), 2);
        let id = reopened
            .insert(&files(), &Values::new().with("path", "/c").with("name", "c"))
            .unwrap();
        assert_eq!(id.0, 3);
    }

    #[test]
    fn older_image_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");

        let v1 = InMemoryStore::open(&path, &Files { version: 1 }).unwrap();
        v1.insert(&files(), &Values::new().with("path", "/a")).unwrap();
        v1.save(&path).unwrap();

        let v2 = InMemoryStore::open(&path, &Files { version: 2 }).unwrap();
        assert_eq!(v2.version().unwrap(), 2);
        assert_eq!(v2.row_count(&files()).unwrap(), 0);
        assert!(v2.schema("cloudfile").unwrap().unwrap().column("size").is_some());
    }

    #[test]
    fn newer_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        InMemoryStore::create(&Files { version: 3 })
            .unwrap()
            .save(&path)
            .unwrap();

        let err = InMemoryStore::open(&path, &Files { version: 2 }).unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { found: 3, expected: 2 }));
    }

    #[test]
    fn foreign_image_is_rejected() {
        struct Other;
        impl StoreDefinition for Other {
            fn name(&self) -> &str {
                "other.db"
            }
            fn version(&self) -> u32 {
                1
            }
            fn create(&self, _store: &InMemoryStore) -> StoreResult<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        InMemoryStore::create(&Files { version: 1 })
            .unwrap()
            .save(&path)
            .unwrap();
        let err = InMemoryStore::open(&path, &Other).unwrap_err();
        assert!(matches!(err, StoreError::DefinitionMismatch { .. }));
    }

    fn write_image(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let store = InMemoryStore::create(&Files { version: 1 }).unwrap();
        store
            .insert(&files(), &Values::new().with("path", "/a").with("name", "a"))
            .unwrap();
        store
            .insert(&files(), &Values::new().with("path", "/b").with("name", "b"))
            .unwrap();
        store.save(path).unwrap();

        let mut image: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        edit(&mut image);
        fs::write(path, serde_json::to_vec(&image).unwrap()).unwrap();
    }

    #[test]
    fn image_with_reused_next_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        write_image(&path, |image| {
            image["tables"][0]["next_id"] = serde_json::json!(2);
        });
        let err = InMemoryStore::open(&path, &Files { version: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(ref m) if m.contains("next id")));
    }

    #[test]
    fn image_with_invalid_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        write_image(&path, |image| {
            image["tables"][0]["schema"]["unique"][0]["columns"] = serde_json::json!(["owner"]);
        });
        let err = InMemoryStore::open(&path, &Files { version: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
    }

    #[test]
    fn image_with_duplicate_resource_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        write_image(&path, |image| {
            let mut copy = image["tables"][0].clone();
            copy["schema"]["name"] = serde_json::json!("shadow");
            image["tables"].as_array_mut().unwrap().push(copy);
        });
        let err = InMemoryStore::open(&path, &Files { version: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(ref m) if m.contains("already in use")));
    }

    #[test]
    fn corrupt_image_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        fs::write(&path, b"{not json").unwrap();
        let err = InMemoryStore::open(&path, &Files { version: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}

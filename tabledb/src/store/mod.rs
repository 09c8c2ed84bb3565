use crate::datastore::{Datastore, DatastoreOptions};
use crate::document::Document;
use crate::error::{Result, TableDbError};
use crate::migration::{self, Migrations};
use crate::schema::{parse_schema, SchemaDefinition};
use crate::table::{ArrayTable, RecordTable, Table};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main entry point for tabledb.
/// Opens the store file for a schema and hands out one table handle per
/// schema table.
pub struct Store {
    datastore: Arc<Datastore>,
    tables: HashMap<String, Table>,
}

impl Store {
    /// Open the store file at `path` with default options. The file is
    /// created on the first write.
    pub fn open(path: impl Into<PathBuf>, schema: SchemaDefinition) -> Result<Self> {
        Self::open_with_options(path, schema, DatastoreOptions::default())
    }

    pub fn open_with_options(
        path: impl Into<PathBuf>,
        schema: SchemaDefinition,
        options: DatastoreOptions,
    ) -> Result<Self> {
        Self::from_datastore(Datastore::new(path, schema, options)?)
    }

    /// Open the store file at `path` with the schema read from a YAML file.
    pub fn open_with_schema_file(
        path: impl Into<PathBuf>,
        schema_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let schema = parse_schema(schema_path.as_ref())?;
        Self::open(path, schema)
    }

    /// Wrap an already configured datastore, e.g. one with a custom id source.
    pub fn from_datastore(datastore: Datastore) -> Result<Self> {
        let datastore = Arc::new(datastore);
        let mut tables = HashMap::new();
        for name in datastore.tables() {
            let table = Table::new(Arc::clone(&datastore), &name)?;
            tables.insert(name, table);
        }
        Ok(Store { datastore, tables })
    }

    /// Get a table handle by its schema name
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| TableDbError::TableNotFound(name.to_string()))
    }

    /// Get an array table handle; fails if the table is a record table
    pub fn array(&self, name: &str) -> Result<&ArrayTable> {
        self.table(name)?
            .as_array()
            .ok_or_else(|| TableDbError::TableKind {
                table: name.to_string(),
                expected: "array",
            })
    }

    /// Get a record table handle; fails if the table is an array table
    pub fn record(&self, name: &str) -> Result<&RecordTable> {
        self.table(name)?
            .as_record()
            .ok_or_else(|| TableDbError::TableKind {
                table: name.to_string(),
                expected: "record",
            })
    }

    pub fn datastore(&self) -> &Arc<Datastore> {
        &self.datastore
    }

    pub fn path(&self) -> &Path {
        self.datastore.path()
    }

    pub fn schema(&self) -> &SchemaDefinition {
        self.datastore.schema()
    }

    /// Schema table names in declaration order
    pub fn tables(&self) -> Vec<String> {
        self.datastore.tables()
    }

    pub fn read(&self) -> Document {
        self.datastore.read()
    }

    /// Replace the whole document. Runs as its own transaction.
    pub fn write(&self, document: &Document) -> Result<()> {
        self.datastore.transaction(|| self.datastore.write(document))
    }

    pub fn version(&self) -> u64 {
        self.datastore.version()
    }

    pub fn flush(&self) {
        self.datastore.flush()
    }

    pub fn drop(&self) -> Result<()> {
        Datastore::drop(&self.datastore)
    }

    pub fn erase(&self) -> Result<()> {
        self.datastore.erase()
    }

    /// Run pending migrations up to `target`; returns the version reached.
    pub fn migrate(&self, target: u64, migrations: Migrations) -> Result<u64> {
        migration::migrate(&self.datastore, target, migrations)
    }
}

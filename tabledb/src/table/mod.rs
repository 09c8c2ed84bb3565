mod array;
mod record;

pub use array::ArrayTable;
pub use record::RecordTable;

use crate::datastore::Datastore;
use crate::document::Document;
use crate::error::{Result, TableDbError};
use crate::schema::{TableDefinition, TableKind};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// State shared by both table facades: the datastore, the current table
/// name and the table's schema definition.
struct TableCore {
    datastore: Arc<Datastore>,
    name: RwLock<String>,
    definition: TableDefinition,
}

impl TableCore {
    fn new(datastore: Arc<Datastore>, name: &str, definition: TableDefinition) -> Self {
        TableCore {
            datastore,
            name: RwLock::new(name.to_string()),
            definition,
        }
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    /// This table's slice of the document, or the empty default when the key
    /// is absent.
    fn data(&self, document: &Document) -> Value {
        document
            .table(&self.name())
            .cloned()
            .unwrap_or_else(|| self.definition.kind.empty_value())
    }

    /// Move the table's data to `new_name` and answer to that name from now on.
    fn rename(&self, new_name: &str) -> Result<()> {
        if new_name.is_empty() || new_name.starts_with('_') {
            return Err(TableDbError::Schema(format!(
                "Invalid table name '{new_name}'"
            )));
        }

        self.datastore.transaction(|| {
            let old_name = self.name();
            if old_name == new_name {
                return Ok(());
            }
            let mut document = self.datastore.read();
            let data = document
                .remove_table(&old_name)
                .unwrap_or_else(|| self.definition.kind.empty_value());
            document.set_table(new_name, data);
            self.datastore.write(&document)?;
            *self.name.write() = new_name.to_string();
            log::info!("Renamed table '{old_name}' to '{new_name}'");
            Ok(())
        })
    }

    /// Remove the table's key from the document.
    fn drop(&self) -> Result<()> {
        self.datastore.update(|document| {
            document.remove_table(&self.name());
            Ok(())
        })
    }
}

/// A table facade, chosen once from the table's schema kind.
pub enum Table {
    Array(ArrayTable),
    Record(RecordTable),
}

impl Table {
    /// Build the facade for the schema table `name`.
    pub fn new(datastore: Arc<Datastore>, name: &str) -> Result<Self> {
        let definition = datastore
            .schema()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| TableDbError::TableNotFound(name.to_string()))?;

        let kind = definition.kind;
        let core = TableCore::new(datastore, name, definition);
        Ok(match kind {
            TableKind::Array => Table::Array(ArrayTable::new(core)),
            TableKind::Record => Table::Record(RecordTable::new(core)),
        })
    }

    fn core(&self) -> &TableCore {
        match self {
            Table::Array(table) => &table.core,
            Table::Record(table) => &table.core,
        }
    }

    /// Current name of the table in the document.
    pub fn name(&self) -> String {
        self.core().name()
    }

    pub fn kind(&self) -> TableKind {
        self.core().definition.kind
    }

    /// The table's schema definition.
    pub fn schema(&self) -> &TableDefinition {
        &self.core().definition
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        self.core().rename(new_name)
    }

    pub fn drop(&self) -> Result<()> {
        self.core().drop()
    }

    pub fn as_array(&self) -> Option<&ArrayTable> {
        match self {
            Table::Array(table) => Some(table),
            Table::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordTable> {
        match self {
            Table::Record(table) => Some(table),
            Table::Array(_) => None,
        }
    }
}

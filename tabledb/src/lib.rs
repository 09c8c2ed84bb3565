pub mod datastore;
pub mod document;
pub mod error;
pub mod migration;
pub mod placeholder;
pub mod query;
pub mod schema;
pub mod storage;
pub mod store;
pub mod table;
pub mod validation;

pub use datastore::{Datastore, DatastoreOptions};
pub use document::Document;
pub use error::{Result, TableDbError};
pub use migration::Migrations;
pub use placeholder::{IdSource, Input, Key, Placeholder};
pub use query::{Predicate, Query, SortOrder};
pub use schema::{FieldDefinition, FieldType, SchemaDefinition, TableDefinition, TableKind};
pub use store::Store;
pub use table::{ArrayTable, RecordTable, Table};

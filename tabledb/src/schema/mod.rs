mod parser;
mod types;

pub use parser::{check_schema, parse_schema, parse_schema_str};
pub use types::{
    FieldDefinition, FieldType, SchemaDefinition, TableDefinition, TableKind, TableMap,
};

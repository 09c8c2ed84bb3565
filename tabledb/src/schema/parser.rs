use crate::error::{Result, TableDbError};
use super::types::{FieldDefinition, FieldType, SchemaDefinition};
use std::path::Path;

/// Parse a schema.yaml file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    check_schema(&schema)?;
    Ok(schema)
}

/// Reject table names that collide with document metadata (`_version` and
/// anything else starting with an underscore) and dangling custom types.
pub fn check_schema(schema: &SchemaDefinition) -> Result<()> {
    for (name, table) in schema.tables.iter() {
        if name.is_empty() {
            return Err(TableDbError::Schema("Table name must not be empty".into()));
        }
        if name.starts_with('_') {
            return Err(TableDbError::Schema(format!(
                "Table name '{name}' is reserved (names starting with '_' hold metadata)"
            )));
        }

        let owner = format!("Table '{name}'");
        for field in table.fields.values().chain(table.value.iter()) {
            check_field_types(schema, &owner, field)?;
        }
    }

    for (name, fields) in schema.types.iter() {
        let owner = format!("Type '{name}'");
        for field in fields.values() {
            check_field_types(schema, &owner, field)?;
        }
    }
    Ok(())
}

fn check_field_types(schema: &SchemaDefinition, owner: &str, field: &FieldDefinition) -> Result<()> {
    if let FieldType::Custom(type_name) = &field.field_type {
        if schema.get_custom_type(type_name).is_none() {
            return Err(TableDbError::Schema(format!(
                "{owner} references unknown type '{type_name}'"
            )));
        }
    }
    if let Some(items) = &field.items {
        check_field_types(schema, owner, items)?;
    }
    if let Some(fields) = &field.fields {
        for nested in fields.values() {
            check_field_types(schema, owner, nested)?;
        }
    }
    Ok(())
}

use crate::schema::{FieldDefinition, FieldType, SchemaDefinition, TableDefinition, TableKind};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Result of validating a table's data
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Validate one table's data against its definition.
/// If strict mode is on, validation issues are errors.
/// If strict mode is off, item-level issues are warnings only; the table
/// shape itself (array vs object) is always an error.
pub fn validate_table(
    schema: &SchemaDefinition,
    name: &str,
    table: &TableDefinition,
    data: &Value,
) -> ValidationResult {
    let mut result = ValidationResult::default();

    match (table.kind, data) {
        (TableKind::Array, Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                validate_item(schema, table, &format!("{name}[{index}]"), item, &mut result);
            }
        }
        (TableKind::Record, Value::Object(entries)) => {
            for (key, item) in entries {
                validate_item(schema, table, &format!("{name}.{key}"), item, &mut result);
            }
        }
        (kind, other) => {
            result.errors.push(format!(
                "Table '{name}' is a {kind} table but holds {}",
                type_name(other)
            ));
        }
    }

    result
}

/// Validate a table's data, returning it unchanged when it conforms and
/// `None` when the caller should substitute the table's empty default.
pub fn validated_table_data(
    schema: &SchemaDefinition,
    name: &str,
    table: &TableDefinition,
    data: Value,
) -> Option<Value> {
    let result = validate_table(schema, name, table, &data);
    for warning in &result.warnings {
        log::warn!("{warning}");
    }
    if result.is_ok() {
        Some(data)
    } else {
        log::warn!(
            "Table '{name}' failed validation, using empty {} table:\n  - {}",
            table.kind,
            result.errors.join("\n  - ")
        );
        None
    }
}

fn validate_item(
    schema: &SchemaDefinition,
    table: &TableDefinition,
    path: &str,
    item: &Value,
    result: &mut ValidationResult,
) {
    if let Some(definition) = &table.value {
        validate_value(schema, path, definition, item, table.strict, result);
        return;
    }
    if table.fields.is_empty() {
        return;
    }
    match item.as_object() {
        Some(object) => validate_fields(
            schema,
            path,
            &table.fields,
            object,
            table.additional_properties,
            table.strict,
            result,
        ),
        None => add_issue(
            result,
            table.strict,
            format!("'{path}' expected object, got {}", type_name(item)),
        ),
    }
}

fn validate_fields(
    schema: &SchemaDefinition,
    path: &str,
    fields: &HashMap<String, FieldDefinition>,
    object: &Map<String, Value>,
    additional_properties: bool,
    strict: bool,
    result: &mut ValidationResult,
) {
    for (field_name, field_def) in fields {
        let field_path = format!("{path}.{field_name}");
        match object.get(field_name) {
            None => {
                if field_def.required {
                    add_issue(result, strict, format!("Required field '{field_path}' is missing"));
                }
            }
            Some(value) => validate_value(schema, &field_path, field_def, value, strict, result),
        }
    }

    if !additional_properties {
        for key in object.keys() {
            if !fields.contains_key(key) {
                add_issue(
                    result,
                    strict,
                    format!("Unexpected field '{path}.{key}' (additional_properties is false)"),
                );
            }
        }
    }
}

fn validate_value(
    schema: &SchemaDefinition,
    path: &str,
    field_def: &FieldDefinition,
    value: &Value,
    strict: bool,
    result: &mut ValidationResult,
) {
    if value.is_null() {
        if !field_def.nullable && field_def.field_type != FieldType::Any {
            add_issue(result, strict, format!("'{path}' must not be null"));
        }
        return;
    }

    match &field_def.field_type {
        FieldType::Any => {}
        FieldType::String => {
            let Some(s) = value.as_str() else {
                add_issue(result, strict, mismatch(path, "string", value));
                return;
            };
            if let Some(enum_values) = &field_def.enum_values {
                if !enum_values.iter().any(|v| v == s) {
                    add_issue(
                        result,
                        strict,
                        format!("'{path}' value '{s}' is not in enum: {enum_values:?}"),
                    );
                }
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                add_issue(result, strict, mismatch(path, "number", value));
            }
        }
        FieldType::Integer => {
            if !(value.is_i64() || value.is_u64()) {
                add_issue(result, strict, mismatch(path, "integer", value));
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                add_issue(result, strict, mismatch(path, "boolean", value));
            }
        }
        FieldType::Datetime => match value.as_str() {
            Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => {}
            Some(s) => add_issue(result, strict, format!("'{path}' value '{s}' is not an RFC 3339 datetime")),
            None => add_issue(result, strict, mismatch(path, "datetime string", value)),
        },
        FieldType::List => {
            let Some(items) = value.as_array() else {
                add_issue(result, strict, mismatch(path, "list", value));
                return;
            };
            if let Some(item_def) = &field_def.items {
                for (index, item) in items.iter().enumerate() {
                    validate_value(schema, &format!("{path}[{index}]"), item_def, item, strict, result);
                }
            }
        }
        FieldType::Object => {
            let Some(object) = value.as_object() else {
                add_issue(result, strict, mismatch(path, "object", value));
                return;
            };
            if let Some(fields) = &field_def.fields {
                validate_fields(schema, path, fields, object, true, strict, result);
            }
        }
        FieldType::Custom(type_name_str) => {
            let Some(type_fields) = schema.get_custom_type(type_name_str) else {
                add_issue(result, strict, format!("'{path}' uses unknown type '{type_name_str}'"));
                return;
            };
            match value.as_object() {
                Some(object) => validate_fields(schema, path, type_fields, object, true, strict, result),
                None => add_issue(
                    result,
                    strict,
                    format!(
                        "'{path}' expected object (type '{type_name_str}'), got {}",
                        type_name(value)
                    ),
                ),
            }
        }
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> String {
    format!("'{path}' expected {expected}, got {}", type_name(value))
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema_str;
    use serde_json::json;

    fn test_schema() -> SchemaDefinition {
        parse_schema_str(
            r#"
types:
  address:
    street: { type: string, required: true }
    city: { type: string, required: true }

tables:
  users:
    kind: record
    fields:
      name: { type: string, required: true }
      age: { type: integer }
      role: { type: string, enum: [admin, member] }
      address: { type: address }
    additional_properties: false

  posts:
    kind: array
    fields:
      id: { type: integer, required: true }
      title: { type: string, required: true }
      content: { type: string, nullable: true }
      tags: { type: list, items: { type: string } }
      published_at: { type: datetime }

  items:
    kind: array
    value: { type: string, nullable: true }

  events:
    kind: array
    fields:
      type: { type: string, required: true }
    strict: false
"#,
        )
        .unwrap()
    }

    fn check(table: &str, data: Value) -> ValidationResult {
        let schema = test_schema();
        let definition = schema.tables.get(table).unwrap().clone();
        validate_table(&schema, table, &definition, &data)
    }

    #[test]
    fn test_valid_record_table() {
        let result = check(
            "users",
            json!({ "1": { "name": "John", "age": 20, "role": "admin" } }),
        );
        assert!(result.is_ok(), "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_wrong_table_shape() {
        let result = check("users", json!("invalid"));
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("record table"));

        let result = check("posts", json!({}));
        assert!(!result.is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let result = check("posts", json!([{ "id": 1 }]));
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("posts[0].title")));
    }

    #[test]
    fn test_null_requires_nullable() {
        let ok = check("posts", json!([{ "id": 1, "title": "a", "content": null }]));
        assert!(ok.is_ok(), "Errors: {:?}", ok.errors);

        let bad = check("posts", json!([{ "id": 1, "title": null }]));
        assert!(bad.errors.iter().any(|e| e.contains("must not be null")));
    }

    #[test]
    fn test_integer_and_list_items() {
        let result = check(
            "posts",
            json!([{ "id": 1.5, "title": "a", "tags": ["x", 2] }]),
        );
        assert!(result.errors.iter().any(|e| e.contains("posts[0].id")));
        assert!(result.errors.iter().any(|e| e.contains("posts[0].tags[1]")));
    }

    #[test]
    fn test_datetime_format() {
        let ok = check(
            "posts",
            json!([{ "id": 1, "title": "a", "published_at": "2024-05-01T12:00:00.000Z" }]),
        );
        assert!(ok.is_ok(), "Errors: {:?}", ok.errors);

        let bad = check("posts", json!([{ "id": 1, "title": "a", "published_at": "yesterday" }]));
        assert!(!bad.is_ok());
    }

    #[test]
    fn test_invalid_enum_value() {
        let result = check("users", json!({ "1": { "name": "John", "role": "owner" } }));
        assert!(result.errors.iter().any(|e| e.contains("owner")));
    }

    #[test]
    fn test_additional_properties_rejected() {
        let result = check("users", json!({ "1": { "name": "John", "extra": true } }));
        assert!(result.errors.iter().any(|e| e.contains("extra")));
    }

    #[test]
    fn test_custom_type_validation() {
        let result = check(
            "users",
            json!({ "1": { "name": "John", "address": { "city": "NYC" } } }),
        );
        assert!(result.errors.iter().any(|e| e.contains("street")));
    }

    #[test]
    fn test_scalar_items() {
        assert!(check("items", json!(["a", "b", null])).is_ok());
        assert!(!check("items", json!(["a", 1])).is_ok());
    }

    #[test]
    fn test_non_strict_mode_warnings() {
        let result = check("events", json!([{ "type": 123 }]));
        assert!(result.is_ok());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_validated_table_data_falls_back() {
        let schema = test_schema();
        let definition = schema.tables.get("users").unwrap().clone();
        assert!(validated_table_data(&schema, "users", &definition, json!([])).is_none());
        assert_eq!(
            validated_table_data(&schema, "users", &definition, json!({})),
            Some(json!({}))
        );
    }
}

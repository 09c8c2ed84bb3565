// The whole-store document: every table's data plus the `_version` stamp

use crate::schema::SchemaDefinition;
use crate::validation;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Key holding the migration version at the top level of the document.
pub const VERSION_KEY: &str = "_version";

/// The parsed contents of a store file.
///
/// `tables` maps table name to its raw data (an array for array tables, an
/// object for record tables). Keys that are not part of the schema are
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub version: Option<u64>,
    pub tables: Map<String, Value>,
}

impl Document {
    /// A document with no tables and no version.
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding every schema table at its empty default.
    pub fn empty(schema: &SchemaDefinition) -> Self {
        let tables = schema
            .tables
            .iter()
            .map(|(name, table)| (name.to_string(), table.kind.empty_value()))
            .collect();
        Document {
            version: None,
            tables,
        }
    }

    /// Build a document from a raw JSON value read from disk.
    ///
    /// Anything other than a JSON object yields the all-empty document. Each
    /// schema table present in the object is validated on its own and
    /// replaced by its empty default when it does not conform. An invalid
    /// `_version` is dropped.
    pub fn from_disk(raw: Value, schema: &SchemaDefinition) -> Self {
        let Value::Object(mut object) = raw else {
            log::warn!("Store file does not hold a JSON object, using empty tables");
            return Self::empty(schema);
        };

        let version = object.remove(VERSION_KEY).and_then(|v| parse_version(&v));

        for (name, table) in schema.tables.iter() {
            if let Some(data) = object.remove(name) {
                let checked = validation::validated_table_data(schema, name, table, data)
                    .unwrap_or_else(|| table.kind.empty_value());
                object.insert(name.to_string(), checked);
            }
        }

        Document {
            version,
            tables: object,
        }
    }

    /// The migration version, 0 when unset.
    pub fn version(&self) -> u64 {
        self.version.unwrap_or(0)
    }

    pub fn table(&self, name: &str) -> Option<&Value> {
        self.tables.get(name)
    }

    pub fn set_table(&mut self, name: &str, data: Value) {
        self.tables.insert(name.to_string(), data);
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Value> {
        self.tables.remove(name)
    }

    /// Serialize to the on-disk JSON shape.
    pub fn to_value(&self) -> Value {
        let mut object = self.tables.clone();
        if let Some(version) = self.version {
            object.insert(VERSION_KEY.to_string(), Value::from(version));
        }
        Value::Object(object)
    }

    /// Parse a document without a schema (no table validation).
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut object) => {
                let version = object.remove(VERSION_KEY).and_then(|v| parse_version(&v));
                Document {
                    version,
                    tables: object,
                }
            }
            _ => Document::default(),
        }
    }
}

fn parse_version(value: &Value) -> Option<u64> {
    match value.as_u64() {
        Some(v) => Some(v),
        None => {
            log::warn!("Ignoring invalid {VERSION_KEY} value: {value}");
            None
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Document::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType, TableDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new()
            .table(
                "users",
                TableDefinition::record()
                    .field("name", FieldDefinition::new(FieldType::String).required()),
            )
            .table("posts", TableDefinition::array())
    }

    #[test]
    fn test_empty_document_has_every_table() {
        let doc = Document::empty(&schema());
        assert_eq!(doc.to_value(), json!({ "users": {}, "posts": [] }));
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_from_disk_replaces_invalid_table_only() {
        let raw = json!({
            "users": "invalid",
            "posts": [1, 2],
            "_version": 3
        });
        let doc = Document::from_disk(raw, &schema());
        assert_eq!(doc.version(), 3);
        assert_eq!(doc.table("users"), Some(&json!({})));
        assert_eq!(doc.table("posts"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_from_disk_non_object() {
        let doc = Document::from_disk(json!([1, 2, 3]), &schema());
        assert_eq!(doc, Document::empty(&schema()));
    }

    #[test]
    fn test_invalid_version_is_zero() {
        let doc = Document::from_disk(json!({ "_version": "two" }), &schema());
        assert_eq!(doc.version, None);
        assert_eq!(doc.version(), 0);

        let doc = Document::from_disk(json!({ "_version": -1 }), &schema());
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let doc = Document::from_disk(json!({ "archive": [1] }), &schema());
        assert_eq!(doc.table("archive"), Some(&json!([1])));
        assert_eq!(doc.table("posts"), None);
    }

    #[test]
    fn test_to_value_includes_version() {
        let mut doc = Document::new();
        doc.version = Some(2);
        doc.set_table("posts", json!([]));
        assert_eq!(doc.to_value(), json!({ "posts": [], "_version": 2 }));
    }
}

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Top-level schema definition, usually parsed from a schema.yaml file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Reusable object shapes, referenced by name from field `type`
    #[serde(default)]
    pub types: HashMap<String, HashMap<String, FieldDefinition>>,
    #[serde(default)]
    pub tables: TableMap,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table, keeping declaration order.
    pub fn table(mut self, name: &str, definition: TableDefinition) -> Self {
        self.tables.insert(name, definition);
        self
    }

    /// Register a reusable object type.
    pub fn custom_type(mut self, name: &str, fields: HashMap<String, FieldDefinition>) -> Self {
        self.types.insert(name.to_string(), fields);
        self
    }

    pub fn get_custom_type(&self, name: &str) -> Option<&HashMap<String, FieldDefinition>> {
        self.types.get(name)
    }

    /// Table names in declaration order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.names().map(str::to_string).collect()
    }
}

/// Sequence (`array`) or key/value map (`record`) storage shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Array,
    Record,
}

impl TableKind {
    /// The value a table of this kind holds when it has no data.
    pub fn empty_value(self) -> Value {
        match self {
            TableKind::Array => Value::Array(Vec::new()),
            TableKind::Record => Value::Object(serde_json::Map::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Array => "array",
            TableKind::Record => "record",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a single table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    pub kind: TableKind,
    /// Object item shape. Ignored when `value` is set.
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
    /// Scalar (or otherwise non-object) item shape
    #[serde(default)]
    pub value: Option<FieldDefinition>,
    #[serde(default = "default_true")]
    pub additional_properties: bool,
    #[serde(default = "default_true")]
    pub strict: bool,
}

fn default_true() -> bool {
    true
}

impl TableDefinition {
    pub fn new(kind: TableKind) -> Self {
        TableDefinition {
            kind,
            fields: HashMap::new(),
            value: None,
            additional_properties: true,
            strict: true,
        }
    }

    pub fn array() -> Self {
        Self::new(TableKind::Array)
    }

    pub fn record() -> Self {
        Self::new(TableKind::Record)
    }

    pub fn field(mut self, name: &str, definition: FieldDefinition) -> Self {
        self.fields.insert(name.to_string(), definition);
        self
    }

    pub fn value(mut self, definition: FieldDefinition) -> Self {
        self.value = Some(definition);
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = allowed;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Definition of a single field (or of a table's scalar items)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub items: Option<Box<FieldDefinition>>,
    #[serde(default)]
    pub fields: Option<HashMap<String, FieldDefinition>>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            nullable: false,
            enum_values: None,
            items: None,
            fields: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn items(mut self, definition: FieldDefinition) -> Self {
        self.items = Some(Box::new(definition));
        self
    }
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Datetime,
    List,
    Object,
    Any,
    #[serde(untagged)]
    Custom(std::string::String),
}

/// Table definitions keyed by name, in declaration order
#[derive(Debug, Clone, Default)]
pub struct TableMap {
    entries: Vec<(String, TableDefinition)>,
}

impl TableMap {
    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: &str, definition: TableDefinition) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = definition,
            None => self.entries.push((name.to_string(), definition)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableDefinition)> {
        self.entries.iter().map(|(n, def)| (n.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TableMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, definition) in &self.entries {
            map.serialize_entry(name, definition)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TableMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableMapVisitor;

        impl<'de> Visitor<'de> for TableMapVisitor {
            type Value = TableMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of table name to table definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TableMap, A::Error> {
                let mut tables = TableMap::default();
                while let Some((name, definition)) =
                    access.next_entry::<String, TableDefinition>()?
                {
                    tables.insert(&name, definition);
                }
                Ok(tables)
            }
        }

        deserializer.deserialize_map(TableMapVisitor)
    }
}

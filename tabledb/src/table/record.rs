use super::TableCore;
use crate::error::{Result, TableDbError};
use crate::placeholder::{resolve_key, Input, Key, Resolver};
use crate::schema::{TableDefinition, TableKind};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A table stored as a map from string key to value.
pub struct RecordTable {
    pub(super) core: TableCore,
}

impl RecordTable {
    pub(super) fn new(core: TableCore) -> Self {
        RecordTable { core }
    }

    pub fn name(&self) -> String {
        self.core.name()
    }

    pub fn kind(&self) -> TableKind {
        TableKind::Record
    }

    pub fn schema(&self) -> &TableDefinition {
        &self.core.definition
    }

    pub fn rename(&self, new_name: &str) -> Result<()> {
        self.core.rename(new_name)
    }

    pub fn drop(&self) -> Result<()> {
        self.core.drop()
    }

    fn entries(&self) -> Map<String, Value> {
        into_entries(self.core.data(&self.core.datastore.read()))
    }

    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Map<String, Value>) -> Result<T>,
    {
        self.core.datastore.update(|document| {
            let name = self.core.name();
            let mut entries = into_entries(self.core.data(document));
            let output = f(&mut entries)?;
            document.set_table(&name, Value::Object(entries));
            Ok(output)
        })
    }

    fn hydrate(&self, entries: &Map<String, Value>, value: Input) -> Result<Value> {
        let existing: Vec<Value> = entries.values().cloned().collect();
        Resolver::new(&existing, self.core.datastore.id_source()).hydrate(value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries().remove(key)
    }

    /// Like [`get`](Self::get), deserializing the value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| serde_json::from_value(value).map_err(TableDbError::from))
            .transpose()
    }

    /// The whole table.
    pub fn select(&self) -> Map<String, Value> {
        self.entries()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Insert `value` under `key` unless the key is taken.
    ///
    /// The key may be a placeholder, resolved against the existing keys.
    /// Returns the stored key and value, or `None` when nothing was added.
    pub fn add(
        &self,
        key: impl Into<Key>,
        value: impl Into<Input>,
    ) -> Result<Option<(String, Value)>> {
        let (key, value) = (key.into(), value.into());
        self.modify(|entries| {
            let key = resolve_key(key, entries.keys(), self.core.datastore.id_source())?;
            if entries.contains_key(&key) {
                return Ok(None);
            }
            let value = self.hydrate(entries, value)?;
            entries.insert(key.clone(), value.clone());
            Ok(Some((key, value)))
        })
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: impl Into<Input>) -> Result<Value> {
        let value = value.into();
        self.modify(|entries| {
            let value = self.hydrate(entries, value)?;
            entries.insert(key.to_string(), value.clone());
            Ok(value)
        })
    }

    /// Store `value` under `key` only if the key already exists.
    pub fn replace(&self, key: &str, value: impl Into<Input>) -> Result<Option<Value>> {
        let value = value.into();
        self.modify(|entries| {
            if !entries.contains_key(key) {
                return Ok(None);
            }
            let value = self.hydrate(entries, value)?;
            entries.insert(key.to_string(), value.clone());
            Ok(Some(value))
        })
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.modify(|entries| Ok(entries.remove(key)))
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        self.modify(|entries| {
            entries.clear();
            Ok(())
        })
    }
}

fn into_entries(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(entries) => entries,
        _ => Map::new(),
    }
}

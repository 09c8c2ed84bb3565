use super::TableCore;
use crate::error::{Result, TableDbError};
use crate::placeholder::{IdSource, Input, Resolver};
use crate::query::{self, Query};
use crate::schema::{TableDefinition, TableKind};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A table stored as an ordered sequence of items.
pub struct ArrayTable {
    pub(super) core: TableCore,
}

impl ArrayTable {
    pub(super) fn new(core: TableCore) -> Self {
        ArrayTable { core }
    }

    pub fn name(&self) -> String {
        self.core.name()
    }

    pub fn kind(&self) -> TableKind {
        TableKind::Array
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

    fn items(&self) -> Vec<Value> {
        into_items(self.core.data(&self.core.datastore.read()))
    }

    /// Run `f` over the table's items inside a transaction and store the
    /// sequence it returns.
    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Vec<Value>) -> Result<(Vec<Value>, T)>,
    {
        self.core.datastore.update(|document| {
            let name = self.core.name();
            let items = into_items(self.core.data(document));
            let (items, output) = f(items)?;
            document.set_table(&name, Value::Array(items));
            Ok(output)
        })
    }

    /// True if any item matches the query.
    pub fn exists(&self, query: &Query) -> bool {
        query::find(&self.items(), query).is_some()
    }

    /// All items matching the query, in sort order and windowed.
    pub fn select(&self, query: &Query) -> Vec<Value> {
        let items = self.items();
        query::filter(&items, query).into_iter().cloned().collect()
    }

    /// The first item matching the query.
    pub fn select_first(&self, query: &Query) -> Option<Value> {
        query::find(&self.items(), query).cloned()
    }

    /// Like [`select`](Self::select), deserializing each item into `T`.
    pub fn select_as<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>> {
        self.select(query)
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(TableDbError::from))
            .collect()
    }

    /// Append an item, resolving placeholders first. Returns the stored item.
    pub fn insert(&self, item: impl Into<Input>) -> Result<Value> {
        let item = item.into();
        let ids = self.core.datastore.id_source();
        self.modify(|mut items| {
            let value = Resolver::new(&items, ids).hydrate(item)?;
            items.push(value.clone());
            Ok((items, value))
        })
    }

    /// Append several items in order. Each item's placeholders see the items
    /// inserted before it, so serial ids keep counting up within the batch.
    pub fn insert_all<I>(&self, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Input>,
    {
        let inputs: Vec<Input> = items.into_iter().map(Into::into).collect();
        let ids = self.core.datastore.id_source();
        self.modify(|mut items| {
            let mut inserted = Vec::with_capacity(inputs.len());
            for input in inputs {
                let value = Resolver::new(&items, ids).hydrate(input)?;
                items.push(value.clone());
                inserted.push(value);
            }
            Ok((items, inserted))
        })
    }

    /// Update every match; with no match, append `data`. Returns the updated
    /// (or appended) items.
    pub fn upsert(&self, query: &Query, data: impl Into<Input>) -> Result<Vec<Value>> {
        self.upsert_with(query, data.into())
    }

    /// Update the first match, or append `data` when nothing matches.
    pub fn upsert_first(&self, query: &Query, data: impl Into<Input>) -> Result<Value> {
        let updated = self.upsert_with(&first(query), data.into())?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| TableDbError::Other(format!("Upsert on '{}' stored nothing", self.name())))
    }

    fn upsert_with(&self, query: &Query, data: Input) -> Result<Vec<Value>> {
        let ids = self.core.datastore.id_source();
        self.modify(|items| {
            let (mut items, mut updated) = update_matches(items, query, &data, ids)?;
            if updated.is_empty() {
                let value = Resolver::new(&items, ids).hydrate(data)?;
                items.push(value.clone());
                updated.push(value);
            }
            Ok((items, updated))
        })
    }

    /// Merge `data` into every match. Object items take `data`'s fields;
    /// anything else is replaced. Returns the updated items.
    pub fn update(&self, query: &Query, data: impl Into<Input>) -> Result<Vec<Value>> {
        self.update_with(query, data.into())
    }

    /// Merge `data` into the first match, if any.
    pub fn update_first(&self, query: &Query, data: impl Into<Input>) -> Result<Option<Value>> {
        let updated = self.update_with(&first(query), data.into())?;
        Ok(updated.into_iter().next())
    }

    fn update_with(&self, query: &Query, data: Input) -> Result<Vec<Value>> {
        let ids = self.core.datastore.id_source();
        self.modify(|items| update_matches(items, query, &data, ids))
    }

    /// Remove every match. Returns the removed items.
    pub fn delete(&self, query: &Query) -> Result<Vec<Value>> {
        self.modify(|items| {
            let mut deleted = Vec::new();
            let items = query::map(items, query, |item| {
                deleted.push(item);
                None
            });
            Ok((items, deleted))
        })
    }

    /// Remove the first match, if any.
    pub fn delete_first(&self, query: &Query) -> Result<Option<Value>> {
        Ok(self.delete(&first(query))?.into_iter().next())
    }

    /// Remove every item.
    pub fn truncate(&self) -> Result<()> {
        self.modify(|_| Ok((Vec::new(), ())))
    }
}

fn into_items(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn first(query: &Query) -> Query {
    query.clone().limit(1)
}

/// Merge `data` into every match. Placeholders are hydrated once per match,
/// against the items plus everything merged so far, so each updated item
/// gets its own generated values.
fn update_matches(
    items: Vec<Value>,
    query: &Query,
    data: &Input,
    ids: &dyn IdSource,
) -> Result<(Vec<Value>, Vec<Value>)> {
    let mut seen = if data.has_placeholders() {
        items.clone()
    } else {
        Vec::new()
    };
    let mut updated = Vec::new();
    let mut failure = None;
    let items = query::map(items, query, |item| {
        if failure.is_some() {
            return Some(item);
        }
        match Resolver::new(&seen, ids).hydrate(data.clone()) {
            Ok(data) => {
                let merged = merge(item, &data);
                seen.push(merged.clone());
                updated.push(merged.clone());
                Some(merged)
            }
            Err(err) => {
                failure = Some(err);
                Some(item)
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok((items, updated)),
    }
}

/// Shallow merge for objects, replacement otherwise.
fn merge(item: Value, data: &Value) -> Value {
    match (item, data) {
        (Value::Object(mut object), Value::Object(fields)) => {
            for (key, value) in fields {
                object.insert(key.clone(), value.clone());
            }
            Value::Object(object)
        }
        (_, data) => data.clone(),
    }
}

// Placeholder tokens resolved to concrete values at write time.
//
// Any leaf of an `Input` tree may be a `Placeholder`. Before the input is
// stored it is hydrated against the table's current contents: `Uuid` becomes
// an identifier not already used at the same field path, `SerialId` becomes
// one more than the largest number at that path, and `Now` becomes the
// current UTC timestamp.

use crate::error::{Result, TableDbError};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key used by the tagged JSON form: `{"$placeholder": "UUID"}`.
pub const PLACEHOLDER_TAG: &str = "$placeholder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Uuid,
    SerialId,
    Now,
}

impl Placeholder {
    pub fn as_str(self) -> &'static str {
        match self {
            Placeholder::Uuid => "UUID",
            Placeholder::SerialId => "SERIAL_ID",
            Placeholder::Now => "NOW",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placeholder {
    type Err = TableDbError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "UUID" => Ok(Placeholder::Uuid),
            "SERIAL_ID" => Ok(Placeholder::SerialId),
            "NOW" => Ok(Placeholder::Now),
            other => Err(TableDbError::InvalidPlaceholder(other.to_string())),
        }
    }
}

/// A value to store, possibly containing placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Value),
    Placeholder(Placeholder),
    Object(BTreeMap<String, Input>),
}

impl Input {
    /// Build an object input from `(field, input)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Input)>,
    {
        Input::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Parse JSON where objects of the form `{"$placeholder": "<NAME>"}`
    /// stand for placeholder tokens.
    pub fn from_tagged_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => {
                if object.len() == 1 {
                    if let Some(tag) = object.get(PLACEHOLDER_TAG) {
                        let name = tag.as_str().ok_or_else(|| {
                            TableDbError::InvalidPlaceholder(tag.to_string())
                        })?;
                        return Ok(Input::Placeholder(name.parse()?));
                    }
                }
                let fields = object
                    .into_iter()
                    .map(|(k, v)| Ok((k, Input::from_tagged_json(v)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(Input::Object(fields))
            }
            other => Ok(Input::Literal(other)),
        }
    }

    /// Whether any leaf is a placeholder.
    pub fn has_placeholders(&self) -> bool {
        match self {
            Input::Literal(_) => false,
            Input::Placeholder(_) => true,
            Input::Object(fields) => fields.values().any(Input::has_placeholders),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<Placeholder> for Input {
    fn from(placeholder: Placeholder) -> Self {
        Input::Placeholder(placeholder)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::String(value.to_string()))
    }
}

/// A record key, possibly generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Literal(String),
    Placeholder(Placeholder),
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Literal(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Literal(key)
    }
}

impl From<Placeholder> for Key {
    fn from(placeholder: Placeholder) -> Self {
        Key::Placeholder(placeholder)
    }
}

/// Source of random identifiers for `UUID` placeholders.
pub trait IdSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4;

impl IdSource for UuidV4 {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Descend through object fields; anything else along the way is absent.
pub fn value_at_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    match path.split_first() {
        None => Some(value),
        Some((field, rest)) => value
            .as_object()
            .and_then(|o| o.get(field))
            .and_then(|v| value_at_path(v, rest)),
    }
}

/// One more than the largest integer found at `path`, as a string.
///
/// JSON numbers and strings holding integers count; anything else is
/// ignored. No numbers at all yields "1". Fails when the next serial does
/// not fit in an `i128`.
pub fn serial_id<'a, I>(existing: I, path: &[String]) -> Result<String>
where
    I: IntoIterator<Item = &'a Value>,
{
    let max = existing
        .into_iter()
        .filter_map(|item| value_at_path(item, path))
        .filter_map(numeric)
        .max()
        .unwrap_or(0);
    let next = max
        .checked_add(1)
        .ok_or_else(|| TableDbError::SerialOverflow(path.join(".")))?;
    Ok(next.to_string())
}

fn numeric(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i128)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// An identifier from `ids` that does not equal any value at `path`.
pub fn unique_id<'a, I>(existing: I, path: &[String], ids: &dyn IdSource) -> String
where
    I: IntoIterator<Item = &'a Value>,
{
    let taken: Vec<&str> = existing
        .into_iter()
        .filter_map(|item| value_at_path(item, path))
        .filter_map(Value::as_str)
        .collect();
    loop {
        let id = ids.generate();
        if !taken.contains(&id.as_str()) {
            return id;
        }
        log::debug!("Generated id {id} already in use, regenerating");
    }
}

/// The current instant as ISO-8601 with milliseconds, e.g. `2024-05-01T12:00:00.000Z`.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resolves placeholders against the existing values of one table.
pub struct Resolver<'a> {
    existing: &'a [Value],
    ids: &'a dyn IdSource,
}

impl<'a> Resolver<'a> {
    /// `existing` holds the table's items (array tables) or values (record tables).
    pub fn new(existing: &'a [Value], ids: &'a dyn IdSource) -> Self {
        Resolver { existing, ids }
    }

    /// Replace every placeholder in `input` with a concrete value.
    pub fn hydrate(&self, input: Input) -> Result<Value> {
        let mut path = Vec::new();
        self.hydrate_at(input, &mut path)
    }

    fn hydrate_at(&self, input: Input, path: &mut Vec<String>) -> Result<Value> {
        match input {
            Input::Literal(value) => Ok(value),
            Input::Placeholder(placeholder) => self.resolve(placeholder, path),
            Input::Object(fields) => {
                let mut object = Map::new();
                for (name, field) in fields {
                    path.push(name.clone());
                    let value = self.hydrate_at(field, path);
                    path.pop();
                    object.insert(name, value?);
                }
                Ok(Value::Object(object))
            }
        }
    }

    fn resolve(&self, placeholder: Placeholder, path: &[String]) -> Result<Value> {
        let value = match placeholder {
            Placeholder::Uuid => unique_id(self.existing, path, self.ids),
            Placeholder::SerialId => serial_id(self.existing, path)?,
            Placeholder::Now => now(),
        };
        Ok(Value::String(value))
    }
}

/// Resolve a record key against the keys already in the table.
pub fn resolve_key<'k, I>(key: Key, existing_keys: I, ids: &dyn IdSource) -> Result<String>
where
    I: IntoIterator<Item = &'k String>,
{
    match key {
        Key::Literal(key) => Ok(key),
        Key::Placeholder(placeholder) => {
            let keys: Vec<Value> = existing_keys
                .into_iter()
                .map(|k| Value::String(k.clone()))
                .collect();
            match placeholder {
                Placeholder::Uuid => Ok(unique_id(&keys, &[], ids)),
                Placeholder::SerialId => serial_id(&keys, &[]),
                Placeholder::Now => Ok(now()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn path(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn is_uuid(s: &str) -> bool {
        uuid::Uuid::parse_str(s).is_ok()
    }

    /// Hands out a fixed sequence of ids.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl IdSource for Scripted {
        fn generate(&self) -> String {
            self.0.lock().remove(0).to_string()
        }
    }

    #[test]
    fn test_serial_id_no_path() {
        let data = vec![json!("1"), json!("2"), json!("3")];
        assert_eq!(serial_id(&data, &[]).unwrap(), "4");
    }

    #[test]
    fn test_serial_id_gaps_and_empty() {
        let data = vec![json!("1"), json!("5"), json!("3")];
        assert_eq!(serial_id(&data, &[]).unwrap(), "6");
        assert_eq!(serial_id(&Vec::new(), &path(&["b"])).unwrap(), "1");
    }

    #[test]
    fn test_serial_id_at_path() {
        let data = vec![
            json!({ "a": "a", "b": "test" }),
            json!({ "a": "b", "b": "5" }),
            json!({ "a": "c", "b": 3 }),
        ];
        assert_eq!(serial_id(&data, &path(&["b"])).unwrap(), "6");
        assert_eq!(serial_id(&data, &path(&["x"])).unwrap(), "1");
    }

    #[test]
    fn test_serial_id_nested_path() {
        let data = vec![
            json!({ "b": { "c": "1" } }),
            json!({ "b": { "c": "2" } }),
            json!({ "b": { "c": "3" } }),
        ];
        assert_eq!(serial_id(&data, &path(&["b", "c"])).unwrap(), "4");
    }

    #[test]
    fn test_serial_id_past_i64() {
        let data = vec![json!("9223372036854775807"), json!(u64::MAX)];
        assert_eq!(serial_id(&data, &[]).unwrap(), "18446744073709551616");
        assert_eq!(serial_id(&[json!(1e300)], &[]).unwrap_err().to_string(), "Serial id overflow at ''");

        let data = vec![json!({ "n": i128::MAX.to_string() })];
        let err = serial_id(&data, &path(&["n"])).unwrap_err();
        assert!(matches!(err, TableDbError::SerialOverflow(at) if at == "n"));
    }

    #[test]
    fn test_value_at_path() {
        let value = json!({ "a": { "b": [1] } });
        assert_eq!(value_at_path(&value, &[]), Some(&value));
        assert_eq!(value_at_path(&value, &path(&["a", "b"])), Some(&json!([1])));
        assert_eq!(value_at_path(&value, &path(&["a", "b", "c"])), None);
        assert_eq!(value_at_path(&json!("x"), &path(&["a"])), None);
    }

    #[test]
    fn test_uuid_is_valid() {
        let data = vec![json!("1"), json!("2")];
        assert!(is_uuid(&unique_id(&data, &[], &UuidV4)));
        assert!(is_uuid(&unique_id(&data, &path(&["x"]), &UuidV4)));
    }

    #[test]
    fn test_uuid_regenerates_on_collision() {
        let data = vec![json!({ "id": "taken" })];
        let ids = Scripted(Mutex::new(vec!["taken", "taken", "free"]));
        assert_eq!(unique_id(&data, &path(&["id"]), &ids), "free");
    }

    #[test]
    fn test_now_format() {
        let stamp = now();
        assert!(stamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
        assert_eq!(stamp.len(), "2024-05-01T12:00:00.000Z".len());
    }

    #[test]
    fn test_hydrate_nested_object() {
        let existing = vec![json!({ "id": "7", "meta": { "seq": 2 } })];
        let resolver = Resolver::new(&existing, &UuidV4);
        let input = Input::object([
            ("id", Input::from(Placeholder::SerialId)),
            ("title", Input::from("hello")),
            ("meta", Input::object([("seq", Input::from(Placeholder::SerialId))])),
            ("created", Input::from(Placeholder::Now)),
            ("ref", Input::from(Placeholder::Uuid)),
        ]);
        let value = resolver.hydrate(input).unwrap();
        assert_eq!(value["id"], json!("8"));
        assert_eq!(value["title"], json!("hello"));
        assert_eq!(value["meta"]["seq"], json!("3"));
        assert!(value["created"].as_str().unwrap().ends_with('Z'));
        assert!(is_uuid(value["ref"].as_str().unwrap()));
    }

    #[test]
    fn test_hydrate_literal_untouched() {
        let resolver = Resolver::new(&[], &UuidV4);
        let value = json!({ "a": [1, { "b": null }] });
        assert_eq!(resolver.hydrate(Input::from(value.clone())).unwrap(), value);
    }

    #[test]
    fn test_tagged_json() {
        let input = Input::from_tagged_json(json!({
            "id": { "$placeholder": "SERIAL_ID" },
            "title": "x"
        }))
        .unwrap();
        assert!(input.has_placeholders());
        let value = Resolver::new(&[], &UuidV4).hydrate(input).unwrap();
        assert_eq!(value, json!({ "id": "1", "title": "x" }));
    }

    #[test]
    fn test_tagged_json_invalid_placeholder() {
        let err = Input::from_tagged_json(json!({ "id": { "$placeholder": "RANDOM" } })).unwrap_err();
        assert!(matches!(err, TableDbError::InvalidPlaceholder(name) if name == "RANDOM"));
        assert!("serial".parse::<Placeholder>().is_err());
    }

    #[test]
    fn test_resolve_key() {
        let keys = vec!["1".to_string(), "2".to_string()];
        assert_eq!(resolve_key(Key::from("9"), &keys, &UuidV4).unwrap(), "9");
        assert_eq!(resolve_key(Placeholder::SerialId.into(), &keys, &UuidV4).unwrap(), "3");
        assert!(is_uuid(&resolve_key(Placeholder::Uuid.into(), &keys, &UuidV4).unwrap()));
    }
}

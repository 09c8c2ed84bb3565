// Recursive "where" predicates. A predicate mirrors the shape of the value it
// is matched against: in the JSON form every key that is an operator name
// (`eq`, `gt`, `startsWith`, `contains`, ...) constrains the value itself and
// every other key names a field of an object value.
//
// Matching never coerces across value kinds. An operator that cannot apply to
// the value (wrong kind, or absent) is unsatisfied and its negated form is
// satisfied.

use crate::error::{Result, TableDbError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum Operator {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    StartsWith(String),
    NStartsWith(String),
    EndsWith(String),
    NEndsWith(String),
    Includes(String),
    NIncludes(String),
    Regex(Regex),
    NRegex(Regex),
    Contains(Box<Predicate>),
    NContains(Box<Predicate>),
}

impl Operator {
    /// The JSON key for this operator.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "eq",
            Operator::Neq(_) => "neq",
            Operator::Gt(_) => "gt",
            Operator::Gte(_) => "gte",
            Operator::Lt(_) => "lt",
            Operator::Lte(_) => "lte",
            Operator::In(_) => "in",
            Operator::Nin(_) => "nin",
            Operator::StartsWith(_) => "startsWith",
            Operator::NStartsWith(_) => "nstartsWith",
            Operator::EndsWith(_) => "endsWith",
            Operator::NEndsWith(_) => "nendsWith",
            Operator::Includes(_) => "includes",
            Operator::NIncludes(_) => "nincludes",
            Operator::Regex(_) => "regex",
            Operator::NRegex(_) => "nregex",
            Operator::Contains(_) => "contains",
            Operator::NContains(_) => "ncontains",
        }
    }

    /// Whether `key` names an operator rather than an object field.
    pub fn is_operator_name(key: &str) -> bool {
        OPERATOR_NAMES.contains(&key)
    }

    pub fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Operator::Eq(operand) => value.is_some_and(|v| values_equal(v, operand)),
            Operator::Neq(operand) => !value.is_some_and(|v| values_equal(v, operand)),
            Operator::Gt(operand) => magnitude(value, operand) == Some(Ordering::Greater),
            Operator::Gte(operand) => {
                matches!(magnitude(value, operand), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::Lt(operand) => magnitude(value, operand) == Some(Ordering::Less),
            Operator::Lte(operand) => {
                matches!(magnitude(value, operand), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::In(list) => member_of(value, list),
            Operator::Nin(list) => !member_of(value, list),
            Operator::StartsWith(s) => text(value, |v| v.starts_with(s.as_str())),
            Operator::NStartsWith(s) => !text(value, |v| v.starts_with(s.as_str())),
            Operator::EndsWith(s) => text(value, |v| v.ends_with(s.as_str())),
            Operator::NEndsWith(s) => !text(value, |v| v.ends_with(s.as_str())),
            Operator::Includes(s) => text(value, |v| v.contains(s.as_str())),
            Operator::NIncludes(s) => !text(value, |v| v.contains(s.as_str())),
            Operator::Regex(re) => text(value, |v| re.is_match(v)),
            Operator::NRegex(re) => !text(value, |v| re.is_match(v)),
            Operator::Contains(p) => any_element(value, p),
            Operator::NContains(p) => !any_element(value, p),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Operator::Eq(v)
            | Operator::Neq(v)
            | Operator::Gt(v)
            | Operator::Gte(v)
            | Operator::Lt(v)
            | Operator::Lte(v) => v.clone(),
            Operator::In(list) | Operator::Nin(list) => Value::Array(list.clone()),
            Operator::StartsWith(s)
            | Operator::NStartsWith(s)
            | Operator::EndsWith(s)
            | Operator::NEndsWith(s)
            | Operator::Includes(s)
            | Operator::NIncludes(s) => Value::String(s.clone()),
            Operator::Regex(re) | Operator::NRegex(re) => Value::String(re.as_str().to_string()),
            Operator::Contains(p) | Operator::NContains(p) => p.to_json(),
        }
    }

    fn from_json(name: &str, operand: &Value) -> Result<Self> {
        let op = match name {
            "eq" => Operator::Eq(operand.clone()),
            "neq" => Operator::Neq(operand.clone()),
            "gt" => Operator::Gt(operand.clone()),
            "gte" => Operator::Gte(operand.clone()),
            "lt" => Operator::Lt(operand.clone()),
            "lte" => Operator::Lte(operand.clone()),
            "in" => Operator::In(list_operand(name, operand)?),
            "nin" => Operator::Nin(list_operand(name, operand)?),
            "startsWith" => Operator::StartsWith(text_operand(name, operand)?),
            "nstartsWith" => Operator::NStartsWith(text_operand(name, operand)?),
            "endsWith" => Operator::EndsWith(text_operand(name, operand)?),
            "nendsWith" => Operator::NEndsWith(text_operand(name, operand)?),
            "includes" => Operator::Includes(text_operand(name, operand)?),
            "nincludes" => Operator::NIncludes(text_operand(name, operand)?),
            "regex" => Operator::Regex(compile(&text_operand(name, operand)?)?),
            "nregex" => Operator::NRegex(compile(&text_operand(name, operand)?)?),
            "contains" => Operator::Contains(Box::new(Predicate::from_json(operand)?)),
            "ncontains" => Operator::NContains(Box::new(Predicate::from_json(operand)?)),
            other => {
                return Err(TableDbError::Validation(format!("Unknown operator '{other}'")))
            }
        };
        Ok(op)
    }
}

const OPERATOR_NAMES: &[&str] = &[
    "eq",
    "neq",
    "gt",
    "gte",
    "lt",
    "lte",
    "in",
    "nin",
    "startsWith",
    "nstartsWith",
    "endsWith",
    "nendsWith",
    "includes",
    "nincludes",
    "regex",
    "nregex",
    "contains",
    "ncontains",
];

/// A recursive matching expression over one JSON value.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    operators: Vec<Operator>,
    fields: BTreeMap<String, Predicate>,
}

macro_rules! value_operator {
    ($(#[$doc:meta] $name:ident => $variant:ident),* $(,)?) => {
        $(
            #[$doc]
            pub fn $name(operand: impl Into<Value>) -> Self {
                Self::operator(Operator::$variant(operand.into()))
            }
        )*
    };
}

macro_rules! text_operator {
    ($(#[$doc:meta] $name:ident => $variant:ident),* $(,)?) => {
        $(
            #[$doc]
            pub fn $name(operand: impl Into<String>) -> Self {
                Self::operator(Operator::$variant(operand.into()))
            }
        )*
    };
}

impl Predicate {
    /// A predicate with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operator(op: Operator) -> Self {
        Predicate {
            operators: vec![op],
            fields: BTreeMap::new(),
        }
    }

    value_operator! {
        /// Equal to the operand.
        eq => Eq,
        /// Not equal to the operand.
        neq => Neq,
        /// Strictly greater (numbers or strings).
        gt => Gt,
        /// Greater or equal (numbers or strings).
        gte => Gte,
        /// Strictly less (numbers or strings).
        lt => Lt,
        /// Less or equal (numbers or strings).
        lte => Lte,
    }

    text_operator! {
        /// String starts with the operand.
        starts_with => StartsWith,
        /// String does not start with the operand.
        not_starts_with => NStartsWith,
        /// String ends with the operand.
        ends_with => EndsWith,
        /// String does not end with the operand.
        not_ends_with => NEndsWith,
        /// String contains the operand.
        includes => Includes,
        /// String does not contain the operand.
        not_includes => NIncludes,
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::operator(Operator::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn none_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::operator(Operator::Nin(values.into_iter().map(Into::into).collect()))
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::operator(Operator::Regex(compile(pattern)?)))
    }

    pub fn not_regex(pattern: &str) -> Result<Self> {
        Ok(Self::operator(Operator::NRegex(compile(pattern)?)))
    }

    /// Some array element matches `element`.
    pub fn contains(element: Predicate) -> Self {
        Self::operator(Operator::Contains(Box::new(element)))
    }

    /// No array element matches `element`.
    pub fn not_contains(element: Predicate) -> Self {
        Self::operator(Operator::NContains(Box::new(element)))
    }

    /// Constrain the object field `name`.
    pub fn field(name: &str, predicate: Predicate) -> Self {
        Self::new().with_field(name, predicate)
    }

    pub fn with_field(mut self, name: &str, predicate: Predicate) -> Self {
        let merged = match self.fields.remove(name) {
            Some(existing) => existing.and(predicate),
            None => predicate,
        };
        self.fields.insert(name.to_string(), merged);
        self
    }

    /// Both predicates must hold.
    pub fn and(mut self, other: Predicate) -> Self {
        self.operators.extend(other.operators);
        for (name, predicate) in other.fields {
            self = self.with_field(&name, predicate);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty() && self.fields.is_empty()
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn fields(&self) -> &BTreeMap<String, Predicate> {
        &self.fields
    }

    /// Match a value; `None` means the value (or field) is absent.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        if !self.operators.iter().all(|op| op.test(value)) {
            return false;
        }
        let object = value.and_then(Value::as_object);
        self.fields
            .iter()
            .all(|(name, predicate)| predicate.matches(object.and_then(|o| o.get(name))))
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for op in &self.operators {
            object.insert(op.name().to_string(), op.to_json());
        }
        for (name, predicate) in &self.fields {
            object.insert(name.clone(), predicate.to_json());
        }
        Value::Object(object)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            TableDbError::Validation(format!("Predicate must be an object, got {value}"))
        })?;
        let mut predicate = Predicate::new();
        for (key, operand) in object {
            if Operator::is_operator_name(key) {
                predicate.operators.push(Operator::from_json(key, operand)?);
            } else {
                predicate = predicate.with_field(key, Predicate::from_json(operand)?);
            }
        }
        Ok(predicate)
    }
}

/// Evaluate `predicate` against `value`; an absent predicate always matches.
pub fn compare(value: Option<&Value>, predicate: Option<&Predicate>) -> bool {
    match predicate {
        None => true,
        Some(p) => p.matches(value),
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Predicate::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// JSON equality where integers and floats with the same value are equal.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Order two numbers or two strings; `None` for any other pairing.
pub(crate) fn same_kind_order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn magnitude(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    same_kind_order(value?, operand)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn member_of(value: Option<&Value>, list: &[Value]) -> bool {
    match value {
        Some(v) if is_primitive(v) => list.iter().any(|item| values_equal(v, item)),
        _ => false,
    }
}

fn text(value: Option<&Value>, test: impl Fn(&str) -> bool) -> bool {
    value.and_then(Value::as_str).is_some_and(test)
}

fn any_element(value: Option<&Value>, predicate: &Predicate) -> bool {
    value
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|item| predicate.matches(Some(item))))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TableDbError::Validation(format!("Invalid regex '{pattern}': {e}")))
}

fn list_operand(name: &str, operand: &Value) -> Result<Vec<Value>> {
    operand.as_array().cloned().ok_or_else(|| {
        TableDbError::Validation(format!("Operator '{name}' expects a list, got {operand}"))
    })
}

fn text_operand(name: &str, operand: &Value) -> Result<String> {
    operand.as_str().map(str::to_string).ok_or_else(|| {
        TableDbError::Validation(format!("Operator '{name}' expects a string, got {operand}"))
    })
}

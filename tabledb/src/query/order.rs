use super::predicate::same_kind_order;
use crate::error::{Result, TableDbError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Where null or missing field values go, regardless of direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullish {
    First,
    Last,
}

/// One `field_direction[_nullish_first|_nullish_last]` sort token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: Direction,
    pub nullish: Option<Nullish>,
}

impl SortOrder {
    pub fn asc(field: &str) -> Self {
        SortOrder {
            field: field.to_string(),
            direction: Direction::Asc,
            nullish: None,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortOrder {
            field: field.to_string(),
            direction: Direction::Desc,
            nullish: None,
        }
    }

    pub fn nullish_first(mut self) -> Self {
        self.nullish = Some(Nullish::First);
        self
    }

    pub fn nullish_last(mut self) -> Self {
        self.nullish = Some(Nullish::Last);
        self
    }

    /// Compare two items on this token's field.
    ///
    /// Two nullish values tie. Without an explicit placement a nullish value
    /// sorts after a defined one in both directions.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = field_value(a, &self.field);
        let right = field_value(b, &self.field);
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => match self.nullish {
                Some(Nullish::First) => Ordering::Less,
                _ => Ordering::Greater,
            },
            (Some(_), None) => match self.nullish {
                Some(Nullish::First) => Ordering::Greater,
                _ => Ordering::Less,
            },
            (Some(x), Some(y)) => {
                let ordering = compare_values(x, y);
                match self.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            }
        }
    }
}

fn field_value<'a>(item: &'a Value, field: &str) -> Option<&'a Value> {
    item.get(field).filter(|v| !v.is_null())
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return x.cmp(y);
    }
    same_kind_order(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b)))
}

impl FromStr for SortOrder {
    type Err = TableDbError;

    fn from_str(token: &str) -> Result<Self> {
        let invalid = || TableDbError::InvalidSortOrder(token.to_string());

        let (rest, nullish) = if let Some(rest) = token.strip_suffix("_nullish_first") {
            (rest, Some(Nullish::First))
        } else if let Some(rest) = token.strip_suffix("_nullish_last") {
            (rest, Some(Nullish::Last))
        } else {
            (token, None)
        };

        let (field, direction) = if let Some(field) = rest.strip_suffix("_asc") {
            (field, Direction::Asc)
        } else if let Some(field) = rest.strip_suffix("_desc") {
            (field, Direction::Desc)
        } else {
            return Err(invalid());
        };

        if field.is_empty() {
            return Err(invalid());
        }

        Ok(SortOrder {
            field: field.to_string(),
            direction,
            nullish,
        })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        write!(f, "{}_{}", self.field, direction)?;
        match self.nullish {
            Some(Nullish::First) => f.write_str("_nullish_first"),
            Some(Nullish::Last) => f.write_str("_nullish_last"),
            None => Ok(()),
        }
    }
}

impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// Accept either a single token or a list of tokens.
pub(crate) fn deserialize_order_by<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<SortOrder>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(SortOrder),
        Many(Vec<SortOrder>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(order) => vec![order],
        OneOrMany::Many(orders) => orders,
    })
}

/// Compare two items through a chain of sort tokens.
pub fn compare_by(orders: &[SortOrder], a: &Value, b: &Value) -> Ordering {
    orders
        .iter()
        .map(|order| order.compare(a, b))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Stable sort of an owned sequence.
pub fn sort(mut items: Vec<Value>, orders: &[SortOrder]) -> Vec<Value> {
    if !orders.is_empty() {
        items.sort_by(|a, b| compare_by(orders, a, b));
    }
    items
}

/// Stable sort returning references into `items`, leaving it untouched.
pub fn sorted<'a>(items: &'a [Value], orders: &[SortOrder]) -> Vec<&'a Value> {
    let mut refs: Vec<&Value> = items.iter().collect();
    if !orders.is_empty() {
        refs.sort_by(|a, b| compare_by(orders, a, b));
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn posts() -> Vec<Value> {
        vec![
            json!({ "id": 1, "title": "Hello World", "content": "..." }),
            json!({ "id": 2, "title": "Second Post", "content": null }),
        ]
    }

    fn reversed() -> Vec<Value> {
        posts().into_iter().rev().collect()
    }

    fn by(token: &str, items: Vec<Value>) -> Vec<Value> {
        sort(items, &[token.parse().unwrap()])
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("id_asc".parse::<SortOrder>().unwrap(), SortOrder::asc("id"));
        assert_eq!(
            "created_at_desc_nullish_first".parse::<SortOrder>().unwrap(),
            SortOrder::desc("created_at").nullish_first()
        );
        assert_eq!(
            "content_asc_nullish_last".parse::<SortOrder>().unwrap().to_string(),
            "content_asc_nullish_last"
        );
        assert!("id".parse::<SortOrder>().is_err());
        assert!("id_up".parse::<SortOrder>().is_err());
        assert!("_asc".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_asc_and_desc() {
        assert_eq!(by("id_asc", posts()), posts());
        assert_eq!(by("id_asc", reversed()), posts());
        assert_eq!(by("id_desc", posts()), reversed());
        assert_eq!(by("id_desc", reversed()), reversed());
    }

    #[test]
    fn test_identical_items_keep_order() {
        let identical = vec![posts()[0].clone(), posts()[0].clone()];
        assert_eq!(by("id_asc", identical.clone()), identical);
        assert_eq!(by("id_desc", identical.clone()), identical);
    }

    #[test]
    fn test_nullish_placement() {
        assert_eq!(by("content_asc_nullish_first", posts()), reversed());
        assert_eq!(by("content_asc_nullish_first", reversed()), reversed());
        assert_eq!(by("content_asc_nullish_last", posts()), posts());
        assert_eq!(by("content_asc_nullish_last", reversed()), posts());
        assert_eq!(by("content_desc_nullish_first", posts()), reversed());
        assert_eq!(by("content_desc_nullish_first", reversed()), reversed());
        assert_eq!(by("content_desc_nullish_last", posts()), posts());
        assert_eq!(by("content_desc_nullish_last", reversed()), posts());
    }

    #[test]
    fn test_default_nulls_sort_last_both_directions() {
        assert_eq!(by("content_asc", reversed()), posts());
        assert_eq!(by("content_desc", reversed()), posts());
    }

    #[test]
    fn test_missing_field_is_nullish() {
        let items = vec![json!({ "id": 1 }), json!({ "id": 2, "rank": 5 })];
        let sorted = by("rank_asc", items);
        assert_eq!(sorted[0], json!({ "id": 2, "rank": 5 }));
    }

    #[test]
    fn test_multiple_tokens() {
        let multiple = vec![
            json!({ "id": 1, "title": "A", "content": null }),
            json!({ "id": 2, "title": "A", "content": null }),
            json!({ "id": 3, "title": "B", "content": null }),
        ];
        let orders = vec![SortOrder::desc("title"), SortOrder::asc("id")];
        assert_eq!(
            sort(multiple.clone(), &orders),
            vec![multiple[2].clone(), multiple[0].clone(), multiple[1].clone()]
        );
    }

    #[test]
    fn test_sort_is_idempotent() {
        let items = vec![
            json!({ "n": 3 }),
            json!({ "n": null }),
            json!({ "n": 1 }),
            json!({ "n": "x" }),
            json!({ "n": 2 }),
        ];
        let orders = vec![SortOrder::asc("n")];
        let once = sort(items, &orders);
        let twice = sort(once.clone(), &orders);
        assert_eq!(once, twice);
        assert_eq!(
            once,
            vec![json!({ "n": 1 }), json!({ "n": 2 }), json!({ "n": 3 }), json!({ "n": "x" }), json!({ "n": null })]
        );
    }

    #[test]
    fn test_sorted_refs_leave_input() {
        let items = reversed();
        let refs = sorted(&items, &[SortOrder::asc("id")]);
        assert_eq!(refs[0]["id"], json!(1));
        assert_eq!(items[0]["id"], json!(2));
    }
}

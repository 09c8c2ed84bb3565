pub mod order;
pub mod predicate;

pub use order::{Direction, Nullish, SortOrder};
pub use predicate::{compare, Operator, Predicate};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selection over an array table: predicate, window and sort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(
        default,
        deserialize_with = "order::deserialize_order_by",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub order_by: Vec<SortOrder>,
}

impl Query {
    /// Match everything, no window, no sort.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(predicate: Predicate) -> Self {
        Query {
            predicate: Some(predicate),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn matches(&self, item: &Value) -> bool {
        compare(Some(item), self.predicate.as_ref())
    }
}

/// Running position among matching elements: skip `offset` matches, act on
/// the next `limit`, then pass everything through.
#[derive(Debug, Clone, Copy)]
enum Zone {
    Skip { remaining: usize, limit: Option<usize> },
    Apply { remaining: Option<usize> },
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Apply,
}

impl Zone {
    fn new(query: &Query) -> Self {
        match query.offset.unwrap_or(0) {
            0 => Zone::applying(query.limit),
            remaining => Zone::Skip {
                remaining,
                limit: query.limit,
            },
        }
    }

    fn applying(limit: Option<usize>) -> Self {
        match limit {
            Some(0) => Zone::PassThrough,
            remaining => Zone::Apply { remaining },
        }
    }

    /// Advance past one matching element and report what to do with it.
    fn step(&mut self) -> Step {
        match *self {
            Zone::Skip { remaining, limit } => {
                *self = if remaining > 1 {
                    Zone::Skip {
                        remaining: remaining - 1,
                        limit,
                    }
                } else {
                    Zone::applying(limit)
                };
                Step::Keep
            }
            Zone::Apply { remaining } => {
                *self = match remaining {
                    None => Zone::Apply { remaining: None },
                    Some(n) => Zone::applying(Some(n - 1)),
                };
                Step::Apply
            }
            Zone::PassThrough => Step::Keep,
        }
    }

    fn is_exhausted(&self) -> bool {
        matches!(self, Zone::PassThrough)
    }
}

/// First element, in sort order, matching the query's predicate.
pub fn find<'a>(items: &'a [Value], query: &Query) -> Option<&'a Value> {
    order::sorted(items, &query.order_by)
        .into_iter()
        .find(|item| query.matches(item))
}

/// Matching elements in sort order, windowed by offset and limit.
pub fn filter<'a>(items: &'a [Value], query: &Query) -> Vec<&'a Value> {
    let mut zone = Zone::new(query);
    let mut selected = Vec::new();
    for item in order::sorted(items, &query.order_by) {
        if zone.is_exhausted() {
            break;
        }
        if query.matches(item) && zone.step() == Step::Apply {
            selected.push(item);
        }
    }
    selected
}

/// Rebuild the sequence, replacing the windowed matches with `transform`'s
/// output. Returning `None` from `transform` drops the element.
///
/// The result is in sort order when the query has one.
pub fn map<F>(items: Vec<Value>, query: &Query, mut transform: F) -> Vec<Value>
where
    F: FnMut(Value) -> Option<Value>,
{
    let mut zone = Zone::new(query);
    let mut result = Vec::with_capacity(items.len());
    for item in order::sort(items, &query.order_by) {
        if zone.is_exhausted() || !query.matches(&item) {
            result.push(item);
            continue;
        }
        match zone.step() {
            Step::Keep => result.push(item),
            Step::Apply => {
                if let Some(replacement) = transform(item) {
                    result.push(replacement);
                }
            }
        }
    }
    result
}

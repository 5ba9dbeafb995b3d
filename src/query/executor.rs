use std::cmp::Ordering;
use std::time::Instant;
use serde::{Serialize, Deserialize};
use crate::core::types::Value;
use crate::core::utils::{compare_optional, get_path};
use crate::query::ast::{Query, SortDirection, SortOption};
use crate::query::matcher::ConditionMatcher;

/// A matching record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub key: String,
    pub value: Value,
}

/// Query results container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResults {
    pub hits: Vec<QueryHit>,
    pub total_matched: usize,  // before offset/limit
    pub from_cache: bool,
    pub took_ms: u64,
}

impl QueryResults {
    pub fn values(&self) -> Vec<Value> {
        self.hits.iter().map(|h| h.value.clone()).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Stateless executor: filter, stable sort, offset, limit, project.
pub struct QueryExecutor;

impl QueryExecutor {
    /// `records` must be yielded in insertion order; that order breaks
    /// sort ties.
    pub fn execute<'a, I>(query: &Query, records: I) -> QueryResults
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let start = Instant::now();
        let matcher = ConditionMatcher::new(&query.conditions);

        let mut matched: Vec<(&String, &Value)> = records
            .into_iter()
            .filter(|(_, value)| matcher.matches(value))
            .collect();

        if !query.sort.is_empty() {
            // slice::sort_by is stable
            matched.sort_by(|a, b| Self::compare(a.1, b.1, &query.sort));
        }

        let total_matched = matched.len();
        let take = query.limit.unwrap_or(usize::MAX);

        let hits = matched
            .into_iter()
            .skip(query.offset)
            .take(take)
            .map(|(key, value)| QueryHit {
                key: key.clone(),
                value: Self::project(value, &query.fields),
            })
            .collect();

        QueryResults {
            hits,
            total_matched,
            from_cache: false,
            took_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn compare(a: &Value, b: &Value, sort: &[SortOption]) -> Ordering {
        for option in sort {
            let ord = compare_optional(get_path(a, &option.field), get_path(b, &option.field));
            let ord = match option.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Keep only the listed field paths; absent fields are left out.
    fn project(value: &Value, fields: &[String]) -> Value {
        if fields.is_empty() {
            return value.clone();
        }

        let mut out = serde_json::Map::new();
        for field in fields {
            if let Some(v) = get_path(value, field) {
                out.insert(field.clone(), v.clone());
            }
        }
        Value::Object(out)
    }
}

use regex::Regex;
use tracing::warn;
use crate::core::types::Value;
use crate::core::utils::{get_path, partial_compare, values_equal};
use crate::query::ast::{Condition, Logic, Operator};

/// Evaluates a condition chain against records.
///
/// Conditions are folded left to right; the `logic` of condition `i`
/// decides how the running result combines with condition `i + 1`.
pub struct ConditionMatcher<'q> {
    conditions: &'q [Condition],
    patterns: Vec<Option<Regex>>,
}

impl<'q> ConditionMatcher<'q> {
    pub fn new(conditions: &'q [Condition]) -> Self {
        let patterns = conditions
            .iter()
            .map(|c| match (c.operator, &c.value) {
                (Operator::Regex, Value::String(pattern)) => match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(field = %c.field, pattern = %pattern, error = %e, "invalid regex, condition never matches");
                        None
                    }
                },
                _ => None,
            })
            .collect();

        ConditionMatcher { conditions, patterns }
    }

    /// Empty chains match everything.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(first) = self.conditions.first() else {
            return true;
        };

        let mut acc = self.matches_condition(record, first, 0);
        for i in 1..self.conditions.len() {
            let next = self.matches_condition(record, &self.conditions[i], i);
            acc = match self.conditions[i - 1].logic() {
                Logic::And => acc && next,
                Logic::Or => acc || next,
                Logic::Not => acc && !next,
            };
        }
        acc
    }

    fn matches_condition(&self, record: &Value, condition: &Condition, idx: usize) -> bool {
        let field = get_path(record, &condition.field);

        // Missing fields only satisfy not_exists
        let Some(actual) = field else {
            return condition.operator == Operator::NotExists;
        };
        let expected = &condition.value;

        match condition.operator {
            Operator::Exists => true,
            Operator::NotExists => false,
            Operator::Eq => values_equal(actual, expected),
            Operator::Ne => !values_equal(actual, expected),
            Operator::Gt => partial_compare(actual, expected).is_some_and(|o| o.is_gt()),
            Operator::Gte => partial_compare(actual, expected).is_some_and(|o| o.is_ge()),
            Operator::Lt => partial_compare(actual, expected).is_some_and(|o| o.is_lt()),
            Operator::Lte => partial_compare(actual, expected).is_some_and(|o| o.is_le()),
            Operator::In => Self::member_of(actual, expected).unwrap_or(false),
            Operator::NotIn => Self::member_of(actual, expected).map(|m| !m).unwrap_or(false),
            Operator::Contains => Self::contains(actual, expected).unwrap_or(false),
            Operator::NotContains => Self::contains(actual, expected).map(|c| !c).unwrap_or(false),
            Operator::StartsWith => match (actual, expected) {
                (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Operator::EndsWith => match (actual, expected) {
                (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
                _ => false,
            },
            Operator::Regex => match (actual, &self.patterns[idx]) {
                (Value::String(s), Some(re)) => re.is_match(s),
                _ => false,
            },
        }
    }

    /// `None` when the operand is not an array.
    fn member_of(actual: &Value, list: &Value) -> Option<bool> {
        match list {
            Value::Array(items) => Some(items.iter().any(|item| values_equal(actual, item))),
            _ => None,
        }
    }

    /// Substring test for strings, membership for arrays.
    fn contains(actual: &Value, needle: &Value) -> Option<bool> {
        match (actual, needle) {
            (Value::String(s), Value::String(sub)) => Some(s.contains(sub.as_str())),
            (Value::Array(items), _) => Some(items.iter().any(|item| values_equal(item, needle))),
            _ => None,
        }
    }
}

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::Value;

/// Comparison operator of a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not_exists")]
    NotExists,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Regex => "regex",
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "regex" => Operator::Regex,
            "exists" => Operator::Exists,
            "not_exists" => Operator::NotExists,
            other => return Err(Error::invalid_input(format!("unknown operator '{}'", other))),
        };
        Ok(op)
    }
}

/// How a condition combines with the *next* condition in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
    Not,  // acc AND NOT next
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Condition {
            field: field.into(),
            operator,
            value,
            logic: None,
        }
    }

    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    pub fn logic(&self) -> Logic {
        self.logic.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,   // 0 → 9, A → Z
    Desc,  // 9 → 0, Z → A
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: u64,  // milliseconds, 0 disables caching
}

impl CachePolicy {
    pub fn is_active(&self) -> bool {
        self.enabled && self.ttl > 0
    }
}

/// Query definition: condition chain, projection, ordering, paging and an
/// optional result cache policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub fields: Vec<String>,
    pub sort: Vec<SortOption>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub cache: Option<CachePolicy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition joined to the previous one with AND.
    pub fn filter(self, field: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.chain(Logic::And, Condition::new(field, operator, value))
    }

    /// Append a condition joined to the previous one with OR.
    pub fn or_filter(self, field: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.chain(Logic::Or, Condition::new(field, operator, value))
    }

    /// Append a condition that must NOT hold, joined with AND.
    pub fn not_filter(self, field: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.chain(Logic::Not, Condition::new(field, operator, value))
    }

    fn chain(mut self, logic: Logic, condition: Condition) -> Self {
        if let Some(last) = self.conditions.last_mut() {
            last.logic = Some(logic);
        }
        self.conditions.push(condition);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortOption { field: field.into(), direction });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn cached(mut self, ttl_ms: u64) -> Self {
        self.cache = Some(CachePolicy { enabled: true, ttl: ttl_ms });
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache.map(|c| c.is_active()).unwrap_or(false)
    }

    /// Canonical serialization used as the result cache key.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::core::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub key: Option<String>,
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn warning(key: Option<&str>, message: impl Into<String>) -> Self {
        ValidationIssue {
            key: key.map(str::to_string),
            field: None,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(key: Option<&str>, message: impl Into<String>) -> Self {
        ValidationIssue {
            key: key.map(str::to_string),
            field: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn on_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

/// Outcome of `DataStore::validate`. Always produced, never an `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub checked: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            valid: true,
            checked: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Warning => self.warnings.push(issue),
            Severity::Error => {
                self.valid = false;
                self.errors.push(issue);
            }
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Record-level rule run by `validate()`. A returned message becomes an
/// error issue for that key; a panic inside the rule is caught and reported
/// the same way.
pub trait RecordValidator: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, key: &str, value: &Value) -> std::result::Result<(), String>;
}

/// Adapter so plain closures can be registered as validators.
pub struct FnValidator<F> {
    name: String,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&str, &Value) -> std::result::Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        FnValidator { name: name.into(), check }
    }
}

impl<F> RecordValidator for FnValidator<F>
where
    F: Fn(&str, &Value) -> std::result::Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, key: &str, value: &Value) -> std::result::Result<(), String> {
        (self.check)(key, value)
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::resource::DEFAULT_ID_FIELD;

/// Debounce window for auto-commit unless configured otherwise.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(200);

type Check = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A named rule attached to one field.
///
/// Only [`Validator::required`] rejects a missing, `null` or empty-string
/// value; every other rule passes on empty input.
#[derive(Clone)]
pub struct Validator {
  name: String,
  message: String,
  required: bool,
  check: Check,
}

impl Validator {
  /// Custom rule; `check` receives present, non-empty values only.
  pub fn new<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
  where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      message: message.into(),
      required: false,
      check: Arc::new(check),
    }
  }

  pub fn required() -> Self {
    Self {
      required: true,
      ..Self::new("required", "This field is required.", |_| true)
    }
  }

  pub fn min(min: f64) -> Self {
    Self::new(
      "min",
      format!("Please enter a value greater than or equal to {}.", min),
      move |v| v.as_f64().is_some_and(|n| n >= min),
    )
  }

  pub fn max(max: f64) -> Self {
    Self::new(
      "max",
      format!("Please enter a value less than or equal to {}.", max),
      move |v| v.as_f64().is_some_and(|n| n <= max),
    )
  }

  pub fn min_length(len: usize) -> Self {
    Self::new(
      "minLength",
      format!("Please enter at least {} characters.", len),
      move |v| text_len(v) >= len,
    )
  }

  pub fn max_length(len: usize) -> Self {
    Self::new(
      "maxLength",
      format!("Please enter no more than {} characters.", len),
      move |v| text_len(v) <= len,
    )
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn validate(&self, field: &str, value: Option<&Value>) -> Option<ValidationFailure> {
    let passed = match value.filter(|v| !is_empty(v)) {
      None => !self.required,
      Some(v) => (self.check)(v),
    };

    (!passed).then(|| ValidationFailure {
      field: field.to_string(),
      rule: self.name.clone(),
      message: self.message.clone(),
    })
  }
}

impl fmt::Debug for Validator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Validator")
      .field("name", &self.name)
      .field("message", &self.message)
      .finish_non_exhaustive()
  }
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

fn text_len(value: &Value) -> usize {
  match value {
    Value::String(s) => s.chars().count(),
    Value::Array(a) => a.len(),
    other => other.to_string().chars().count(),
  }
}

/// One failing validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
  pub field: String,
  pub rule: String,
  pub message: String,
}

impl fmt::Display for ValidationFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

/// Extra lookup maintained by a record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
  /// value → record
  Single(String),
  /// first value → second value → record
  Compound(String, String),
}

impl IndexSpec {
  /// Name the index is looked up by: the field, or `first:second`.
  pub fn name(&self) -> String {
    match self {
      Self::Single(field) => field.clone(),
      Self::Compound(first, second) => format!("{}:{}", first, second),
    }
  }
}

/// Behavior shared by every record of a set.
#[derive(Debug, Clone)]
pub struct RecordOptions {
  /// Identifying field; `None` disables id-based operations
  pub id: Option<String>,
  pub indexes: Vec<IndexSpec>,
  /// Commit automatically once dirty and valid
  pub immediate_commit: bool,
  /// Debounce window for immediate commits
  pub rate_limit: Duration,
  pub validators: BTreeMap<String, Vec<Validator>>,
}

impl Default for RecordOptions {
  fn default() -> Self {
    Self {
      id: Some(DEFAULT_ID_FIELD.to_string()),
      indexes: Vec::new(),
      immediate_commit: false,
      rate_limit: DEFAULT_RATE_LIMIT,
      validators: BTreeMap::new(),
    }
  }
}

impl RecordOptions {
  pub fn with_id(mut self, field: impl Into<String>) -> Self {
    self.id = Some(field.into());
    self
  }

  pub fn without_id(mut self) -> Self {
    self.id = None;
    self
  }

  pub fn with_index(mut self, index: IndexSpec) -> Self {
    self.indexes.push(index);
    self
  }

  pub fn immediate_commit(mut self, enabled: bool) -> Self {
    self.immediate_commit = enabled;
    self
  }

  pub fn rate_limit(mut self, window: Duration) -> Self {
    self.rate_limit = window;
    self
  }

  pub fn validate(mut self, field: impl Into<String>, validator: Validator) -> Self {
    self
      .validators
      .entry(field.into())
      .or_default()
      .push(validator);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_required_rejects_empty() {
    let rule = Validator::required();
    assert!(rule.validate("title", None).is_some());
    assert!(rule.validate("title", Some(&Value::Null)).is_some());
    assert!(rule.validate("title", Some(&json!(""))).is_some());
    assert!(rule.validate("title", Some(&json!("x"))).is_none());
  }

  #[test]
  fn test_other_rules_pass_on_empty() {
    assert!(Validator::min(3.0).validate("n", None).is_none());
    assert!(Validator::min_length(3).validate("s", Some(&json!(""))).is_none());
  }

  #[test]
  fn test_range_and_length_rules() {
    let failure = Validator::max(10.0).validate("n", Some(&json!(11))).unwrap();
    assert_eq!(failure.rule, "max");
    assert_eq!(failure.field, "n");
    assert!(Validator::min(1.0).validate("n", Some(&json!(1))).is_none());
    assert!(Validator::max_length(3).validate("s", Some(&json!("abcd"))).is_some());
    assert!(Validator::min(1.0).validate("n", Some(&json!("one"))).is_some());
  }

  #[test]
  fn test_index_names() {
    assert_eq!(IndexSpec::Single("owner".into()).name(), "owner");
    assert_eq!(
      IndexSpec::Compound("owner".into(), "day".into()).name(),
      "owner:day"
    );
  }

  #[test]
  fn test_defaults() {
    let options = RecordOptions::default();
    assert_eq!(options.id.as_deref(), Some("id"));
    assert_eq!(options.rate_limit, Duration::from_millis(200));
    assert!(!options.immediate_commit);
  }
}

//! The resource client contract and its concrete implementations.
//!
//! A resource client performs CRUD against one remote collection. Every
//! decorator in [`crate::cache`] implements the same trait, so consumers
//! cannot tell a raw client from a cached one except by latency.

mod client;
mod stub;

pub use client::RestClient;
pub use stub::StubClient;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Field name used for identity unless configured otherwise.
pub const DEFAULT_ID_FIELD: &str = "id";

/// One member of a remote collection.
pub type Item = Map<String, Value>;

/// Identifying-field value of an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
  Num(i64),
  Str(String),
}

impl Id {
  /// Read an id out of a JSON value. `null` and non-scalar values have no id.
  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_i64().map(Self::Num),
      Value::String(s) => Some(Self::Str(s.clone())),
      _ => None,
    }
  }

  pub fn to_value(&self) -> Value {
    match self {
      Self::Num(n) => Value::from(*n),
      Self::Str(s) => Value::from(s.as_str()),
    }
  }

  /// Id of `item` under `field`, if set.
  pub fn of(item: &Item, field: &str) -> Option<Self> {
    item.get(field).and_then(Self::from_value)
  }
}

impl fmt::Display for Id {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Num(n) => write!(f, "{}", n),
      Self::Str(s) => f.write_str(s),
    }
  }
}

impl From<i64> for Id {
  fn from(n: i64) -> Self {
    Self::Num(n)
  }
}

impl From<&str> for Id {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<String> for Id {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

/// CRUD against one remote collection endpoint.
#[async_trait]
pub trait ResourceClient: Send + Sync {
  /// Fetch the whole collection.
  async fn list(&self) -> Result<Vec<Item>>;

  /// Fetch one item by id.
  async fn get(&self, id: &Id) -> Result<Option<Item>>;

  /// Create an item, returning the server's copy.
  async fn post(&self, item: &Item) -> Result<Item>;

  /// Replace an existing item, returning the server's copy.
  async fn put(&self, item: &Item) -> Result<Item>;

  async fn del(&self, id: &Id) -> Result<()>;

  /// Wait for side effects that were deferred past a call's return.
  async fn settle(&self) -> Result<()> {
    Ok(())
  }
}

#[async_trait]
impl<C: ResourceClient + ?Sized> ResourceClient for Arc<C> {
  async fn list(&self) -> Result<Vec<Item>> {
    (**self).list().await
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    (**self).get(id).await
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    (**self).post(item).await
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    (**self).put(item).await
  }

  async fn del(&self, id: &Id) -> Result<()> {
    (**self).del(id).await
  }

  async fn settle(&self) -> Result<()> {
    (**self).settle().await
  }
}

/// Position of the item whose id under `field` equals `id`.
pub(crate) fn position_of(items: &[Item], field: &str, id: &Id) -> Option<usize> {
  items
    .iter()
    .position(|item| Id::of(item, field).as_ref() == Some(id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_id_from_value() {
    assert_eq!(Id::from_value(&json!(3)), Some(Id::Num(3)));
    assert_eq!(Id::from_value(&json!("a-1")), Some(Id::from("a-1")));
    assert_eq!(Id::from_value(&Value::Null), None);
    assert_eq!(Id::from_value(&json!(1.5)), None);
  }

  #[test]
  fn test_id_display_is_path_segment() {
    assert_eq!(Id::Num(42).to_string(), "42");
    assert_eq!(Id::from("abc").to_string(), "abc");
  }

  #[test]
  fn test_position_of() {
    let items: Vec<Item> = vec![
      json!({"id": 0}).as_object().cloned().unwrap(),
      json!({"id": 5}).as_object().cloned().unwrap(),
    ];
    assert_eq!(position_of(&items, "id", &Id::Num(5)), Some(1));
    assert_eq!(position_of(&items, "id", &Id::Num(7)), None);
  }
}

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{position_of, Id, Item, ResourceClient, DEFAULT_ID_FIELD};

/// In-memory resource client for tests.
///
/// Clone-friendly: clones share the same item store, so a test can keep a
/// handle after passing the stub into a decorator. Every call completes on
/// its first poll.
#[derive(Clone, Debug)]
pub struct StubClient {
  items: Arc<Mutex<Vec<Item>>>,
  id_field: String,
}

impl StubClient {
  /// Seed the store with `size` items built by `factory(index)`.
  pub fn new<F>(size: usize, factory: F) -> Self
  where
    F: FnMut(usize) -> Item,
  {
    Self {
      items: Arc::new(Mutex::new((0..size).map(factory).collect())),
      id_field: DEFAULT_ID_FIELD.to_string(),
    }
  }

  pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
    self.id_field = field.into();
    self
  }

  /// Copy of the current store contents.
  pub fn items(&self) -> Vec<Item> {
    self.lock().map(|items| items.clone()).unwrap_or_default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<Item>>> {
    self
      .items
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
  }

  fn next_id(&self, items: &[Item]) -> i64 {
    items
      .iter()
      .filter_map(|item| item.get(&self.id_field).and_then(Value::as_i64))
      .max()
      .map_or(0, |max| max + 1)
  }
}

#[async_trait]
impl ResourceClient for StubClient {
  async fn list(&self) -> Result<Vec<Item>> {
    Ok(self.lock()?.clone())
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    let items = self.lock()?;
    Ok(position_of(&items, &self.id_field, id).map(|i| items[i].clone()))
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    let mut items = self.lock()?;
    let mut created = item.clone();
    if Id::of(&created, &self.id_field).is_none() {
      let id = self.next_id(&items);
      created.insert(self.id_field.clone(), Value::from(id));
    }
    items.push(created.clone());
    Ok(created)
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    let id = Id::of(item, &self.id_field).ok_or_else(|| {
      Error::Argument(format!("put requires \"{}\" to be set", self.id_field))
    })?;

    let mut items = self.lock()?;
    let index = position_of(&items, &self.id_field, &id).ok_or(Error::NotFound(id))?;
    items[index] = item.clone();
    Ok(item.clone())
  }

  async fn del(&self, id: &Id) -> Result<()> {
    let field = &self.id_field;
    self
      .lock()?
      .retain(|item| Id::of(item, field).as_ref() != Some(id));
    Ok(())
  }
}

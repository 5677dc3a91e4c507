//! Test helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::resource::{Id, Item, ResourceClient, StubClient};

pub fn todo(i: usize) -> Item {
  json!({"id": i, "title": format!("todo {}", i), "done": false})
    .as_object()
    .cloned()
    .unwrap()
}

#[derive(Default)]
struct Calls {
  list: AtomicUsize,
  get: AtomicUsize,
  post: AtomicUsize,
  put: AtomicUsize,
  del: AtomicUsize,
}

/// Stub client that counts the calls reaching it.
#[derive(Clone)]
pub struct CountingClient {
  stub: StubClient,
  calls: Arc<Calls>,
}

impl CountingClient {
  pub fn seeded(size: usize) -> Self {
    Self {
      stub: StubClient::new(size, todo),
      calls: Arc::default(),
    }
  }

  pub fn stub(&self) -> &StubClient {
    &self.stub
  }

  pub fn list_calls(&self) -> usize {
    self.calls.list.load(Ordering::SeqCst)
  }

  pub fn get_calls(&self) -> usize {
    self.calls.get.load(Ordering::SeqCst)
  }

  pub fn post_calls(&self) -> usize {
    self.calls.post.load(Ordering::SeqCst)
  }

  pub fn put_calls(&self) -> usize {
    self.calls.put.load(Ordering::SeqCst)
  }

  pub fn del_calls(&self) -> usize {
    self.calls.del.load(Ordering::SeqCst)
  }

  /// Calls of any kind.
  pub fn total_calls(&self) -> usize {
    self.list_calls() + self.get_calls() + self.post_calls() + self.put_calls() + self.del_calls()
  }
}

#[async_trait]
impl ResourceClient for CountingClient {
  async fn list(&self) -> Result<Vec<Item>> {
    self.calls.list.fetch_add(1, Ordering::SeqCst);
    self.stub.list().await
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    self.calls.get.fetch_add(1, Ordering::SeqCst);
    self.stub.get(id).await
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    self.calls.post.fetch_add(1, Ordering::SeqCst);
    self.stub.post(item).await
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    self.calls.put.fetch_add(1, Ordering::SeqCst);
    self.stub.put(item).await
  }

  async fn del(&self, id: &Id) -> Result<()> {
    self.calls.del.fetch_add(1, Ordering::SeqCst);
    self.stub.del(id).await
  }
}

//! In-memory caching decorator.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::resource::{Id, Item, ResourceClient, DEFAULT_ID_FIELD};

use super::snapshot::Snapshot;

/// Resource client that serves reads from a memoized snapshot.
///
/// The snapshot is fetched once, on the first read, and afterwards kept in
/// step with writes issued through this decorator. Its expiry is recorded but
/// reads only check whether a snapshot exists; use [`CachedClient::evict`] to
/// force a refetch.
pub struct CachedClient<C> {
  inner: C,
  snapshot: Mutex<Option<Snapshot>>,
  ttl: Duration,
  clock: Arc<dyn Clock>,
  id_field: String,
}

impl<C: ResourceClient> CachedClient<C> {
  pub fn new(inner: C, ttl: Duration) -> Self {
    Self {
      inner,
      snapshot: Mutex::new(None),
      ttl,
      clock: Arc::new(SystemClock),
      id_field: DEFAULT_ID_FIELD.to_string(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
    self.id_field = field.into();
    self
  }

  /// The wrapped client.
  pub fn inner(&self) -> &C {
    &self.inner
  }

  /// Drop the snapshot so the next read refetches.
  pub fn evict(&self) -> Result<()> {
    *self.lock()? = None;
    Ok(())
  }

  /// Expiry recorded at the last fetch, if a snapshot is held.
  pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
    Ok(self.lock()?.as_ref().map(|s| s.expires_at))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Option<Snapshot>>> {
    self
      .snapshot
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
  }

  /// Current snapshot items, fetching them if nothing is cached yet.
  async fn ensure_snapshot(&self) -> Result<Vec<Item>> {
    let cached = self.lock()?.as_ref().map(|s| s.items.clone());
    if let Some(items) = cached {
      debug!(items = items.len(), "memory cache hit");
      return Ok(items);
    }

    debug!("memory cache empty, fetching collection");
    let items = self.inner.list().await?;
    let expires_at = self.clock.now() + self.ttl;
    *self.lock()? = Some(Snapshot::new(items.clone(), expires_at));
    Ok(items)
  }

  /// Apply a write to the snapshot, if one is held.
  fn write_through(&self, apply: impl FnOnce(&mut Snapshot)) -> Result<()> {
    if let Some(snapshot) = self.lock()?.as_mut() {
      apply(snapshot);
    }
    Ok(())
  }
}

#[async_trait]
impl<C: ResourceClient> ResourceClient for CachedClient<C> {
  async fn list(&self) -> Result<Vec<Item>> {
    self.ensure_snapshot().await
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    let items = self.ensure_snapshot().await?;
    Ok(
      items
        .into_iter()
        .find(|item| Id::of(item, &self.id_field).as_ref() == Some(id)),
    )
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    let created = self.inner.post(item).await?;
    self.write_through(|s| s.append(created.clone()))?;
    Ok(created)
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    let updated = self.inner.put(item).await?;
    self.write_through(|s| s.upsert(&self.id_field, updated.clone()))?;
    Ok(updated)
  }

  async fn del(&self, id: &Id) -> Result<()> {
    self.inner.del(id).await?;
    self.write_through(|s| {
      s.remove(&self.id_field, id);
    })
  }

  async fn settle(&self) -> Result<()> {
    self.inner.settle().await
  }
}

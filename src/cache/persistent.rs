//! Caching decorator backed by a persistent key-value store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::resource::{Id, Item, ResourceClient, DEFAULT_ID_FIELD};

use super::snapshot::Snapshot;
use super::storage::KeyValueStore;

const PROBE_KEY: &str = "__test";

/// Resource client whose snapshot lives in a [`KeyValueStore`].
///
/// The snapshot is stored under `key` and its expiry (milliseconds since the
/// Unix epoch) under `key_timeout`, so a later process with the same store
/// picks it up. Reads serve the stored snapshot until the expiry passes.
///
/// Writes return as soon as the wrapped client answers. The matching snapshot
/// update runs as a spawned task afterwards; a read issued right after a write
/// may still see the old snapshot. [`ResourceClient::settle`] waits for those
/// updates.
///
/// The store is probed once at construction. If it cannot be written, every
/// call goes straight to the wrapped client.
pub struct PersistentCachedClient<C, S> {
  cache: StoreCache<C, S>,
  pending: Mutex<Vec<JoinHandle<()>>>,
}

/// Everything a deferred update needs, cheap to clone into a task.
struct StoreCache<C, S> {
  inner: Arc<C>,
  store: Arc<S>,
  key: String,
  timeout_key: String,
  ttl: Duration,
  clock: Arc<dyn Clock>,
  id_field: String,
  supported: bool,
  /// Held for every read-modify-write of the stored snapshot
  write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<C, S> Clone for StoreCache<C, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      store: Arc::clone(&self.store),
      key: self.key.clone(),
      timeout_key: self.timeout_key.clone(),
      ttl: self.ttl,
      clock: Arc::clone(&self.clock),
      id_field: self.id_field.clone(),
      supported: self.supported,
      write_lock: Arc::clone(&self.write_lock),
    }
  }
}

/// A write whose snapshot update has not been applied yet.
#[derive(Debug)]
enum PendingWrite {
  Created(Item),
  Updated(Item),
  Deleted(Id),
}

/// Derive a stable store key from an endpoint URL.
pub fn default_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.trim_end_matches('/').as_bytes());
  format!("restbind_{}", hex::encode(hasher.finalize()))
}

fn probe<S: KeyValueStore>(store: &S) -> bool {
  store
    .set(PROBE_KEY, PROBE_KEY)
    .and_then(|_| store.remove(PROBE_KEY))
    .is_ok()
}

impl<C, S> PersistentCachedClient<C, S>
where
  C: ResourceClient + 'static,
  S: KeyValueStore + 'static,
{
  pub fn new(inner: C, store: S, key: impl Into<String>, ttl: Duration) -> Self {
    let key = key.into();
    let supported = probe(&store);
    if !supported {
      warn!(%key, "key-value store unavailable, persistent cache disabled");
    }

    Self {
      cache: StoreCache {
        inner: Arc::new(inner),
        store: Arc::new(store),
        timeout_key: format!("{}_timeout", key),
        key,
        ttl,
        clock: Arc::new(SystemClock),
        id_field: DEFAULT_ID_FIELD.to_string(),
        supported,
        write_lock: Arc::new(tokio::sync::Mutex::new(())),
      },
      pending: Mutex::new(Vec::new()),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.cache.clock = clock;
    self
  }

  pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
    self.cache.id_field = field.into();
    self
  }

  /// Whether the store passed the construction probe.
  pub fn is_supported(&self) -> bool {
    self.cache.supported
  }

  pub fn inner(&self) -> &C {
    &self.cache.inner
  }

  /// Remove the stored snapshot and its expiry.
  pub fn evict(&self) -> Result<()> {
    if !self.cache.supported {
      return Ok(());
    }
    self.cache.store.remove(&self.cache.key)?;
    self.cache.store.remove(&self.cache.timeout_key)
  }

  /// Snapshot currently in the store, regardless of freshness.
  pub fn stored(&self) -> Result<Option<Snapshot>> {
    self.cache.stored()
  }

  /// Schedule the snapshot update for a write that already succeeded.
  async fn defer(&self, write: PendingWrite) {
    let cache = self.cache.clone();
    let update = async move {
      if let Err(e) = cache.apply(write).await {
        warn!(key = %cache.key, error = %e, "deferred cache update failed");
      }
    };

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let task = handle.spawn(update);
        if let Ok(mut pending) = self.pending.lock() {
          pending.retain(|t| !t.is_finished());
          pending.push(task);
        }
      }
      // Not on a Tokio runtime: apply in place
      Err(_) => update.await,
    }
  }
}

impl<C: ResourceClient, S: KeyValueStore> StoreCache<C, S> {
  fn stored_expiry(&self) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = self.store.get(&self.timeout_key)? else {
      return Ok(None);
    };
    let millis: i64 = serde_json::from_str(&raw)?;
    Ok(DateTime::from_timestamp_millis(millis))
  }

  fn stored(&self) -> Result<Option<Snapshot>> {
    if !self.supported {
      return Ok(None);
    }
    let (Some(expires_at), Some(raw)) = (self.stored_expiry()?, self.store.get(&self.key)?) else {
      return Ok(None);
    };
    Ok(Some(Snapshot::new(serde_json::from_str(&raw)?, expires_at)))
  }

  fn persist(&self, snapshot: &Snapshot) -> Result<()> {
    self
      .store
      .set(&self.key, &serde_json::to_string(&snapshot.items)?)?;
    self.store.set(
      &self.timeout_key,
      &serde_json::to_string(&snapshot.expires_at.timestamp_millis())?,
    )
  }

  async fn refresh(&self) -> Result<Snapshot> {
    debug!(key = %self.key, "refetching collection for persistent cache");
    let items = self.inner.list().await?;
    let snapshot = Snapshot::new(items, self.clock.now() + self.ttl);
    self.persist(&snapshot)?;
    Ok(snapshot)
  }

  /// Stored snapshot if its expiry has not passed.
  fn fresh(&self) -> Option<Snapshot> {
    match self.stored() {
      Ok(Some(snapshot)) if self.clock.now() <= snapshot.expires_at => {
        debug!(key = %self.key, items = snapshot.items.len(), "persistent cache hit");
        Some(snapshot)
      }
      Ok(_) => None,
      Err(e) => {
        warn!(key = %self.key, error = %e, "unreadable cache entry, refetching");
        None
      }
    }
  }

  /// Snapshot for a read. A refetch waits for pending updates so an older
  /// listing cannot overwrite one of them.
  async fn read(&self) -> Result<Snapshot> {
    if let Some(snapshot) = self.fresh() {
      return Ok(snapshot);
    }
    let _guard = self.write_lock.lock().await;
    self.fetch_if_stale().await
  }

  /// Fresh stored snapshot, or a refetched one. Callers hold `write_lock`.
  async fn fetch_if_stale(&self) -> Result<Snapshot> {
    match self.fresh() {
      Some(snapshot) => Ok(snapshot),
      None => self.refresh().await,
    }
  }

  async fn apply(&self, write: PendingWrite) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let mut snapshot = self.fetch_if_stale().await?;
    match write {
      // A refetch may already contain the new item
      PendingWrite::Created(item) | PendingWrite::Updated(item) => {
        snapshot.upsert(&self.id_field, item)
      }
      PendingWrite::Deleted(id) => {
        snapshot.remove(&self.id_field, &id);
      }
    }
    self.persist(&snapshot)
  }
}

#[async_trait]
impl<C, S> ResourceClient for PersistentCachedClient<C, S>
where
  C: ResourceClient + 'static,
  S: KeyValueStore + 'static,
{
  async fn list(&self) -> Result<Vec<Item>> {
    if !self.cache.supported {
      return self.cache.inner.list().await;
    }
    Ok(self.cache.read().await?.items)
  }

  async fn get(&self, id: &Id) -> Result<Option<Item>> {
    if !self.cache.supported {
      return self.cache.inner.get(id).await;
    }
    let snapshot = self.cache.read().await?;
    Ok(snapshot.find(&self.cache.id_field, id).cloned())
  }

  async fn post(&self, item: &Item) -> Result<Item> {
    let created = self.cache.inner.post(item).await?;
    if self.cache.supported {
      self.defer(PendingWrite::Created(created.clone())).await;
    }
    Ok(created)
  }

  async fn put(&self, item: &Item) -> Result<Item> {
    let updated = self.cache.inner.put(item).await?;
    if self.cache.supported {
      self.defer(PendingWrite::Updated(updated.clone())).await;
    }
    Ok(updated)
  }

  async fn del(&self, id: &Id) -> Result<()> {
    self.cache.inner.del(id).await?;
    if self.cache.supported {
      self.defer(PendingWrite::Deleted(id.clone())).await;
    }
    Ok(())
  }

  async fn settle(&self) -> Result<()> {
    let tasks = match self.pending.lock() {
      Ok(mut pending) => std::mem::take(&mut *pending),
      Err(e) => return Err(Error::Storage(format!("Lock poisoned: {}", e))),
    };

    for task in tasks {
      if let Err(e) = task.await {
        warn!(error = %e, "deferred cache update panicked");
      }
    }

    self.cache.inner.settle().await
  }
}

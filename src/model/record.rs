use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resource::{Id, Item, ResourceClient};

use super::options::{RecordOptions, ValidationFailure};
use super::reactive::{self, Dependency, Observable};

/// One item of a remote collection with dirty and validity tracking.
///
/// Cloning yields another handle to the same record.
///
/// With immediate commit enabled, a change that leaves the record dirty and
/// valid schedules a commit; further changes within the rate limit window
/// postpone it, so a burst of edits costs one request.
#[derive(Clone)]
pub struct Record {
  inner: Arc<RecordInner>,
}

struct RecordInner {
  client: Arc<dyn ResourceClient>,
  options: Arc<RecordOptions>,
  fields: Observable<Item>,
  /// Serialized fields at the last commit/map; `None` forces dirty
  baseline: Observable<Option<String>>,
  immediate_commit: Observable<bool>,
  auto_commit: Option<JoinHandle<()>>,
}

impl Drop for RecordInner {
  fn drop(&mut self) {
    if let Some(task) = self.auto_commit.take() {
      task.abort();
    }
  }
}

fn fingerprint(item: &Item) -> String {
  // Map keys are ordered, so equal items serialize identically
  serde_json::to_string(item).unwrap_or_default()
}

impl Record {
  /// Wrap `data`. The new record starts clean.
  ///
  /// The auto-commit rule is spawned on the current Tokio runtime; outside
  /// one, immediate commits never fire.
  pub fn new(data: Item, client: Arc<dyn ResourceClient>, options: Arc<RecordOptions>) -> Self {
    let baseline = Observable::new(Some(fingerprint(&data)));
    let fields = Observable::new(data);
    let immediate_commit = Observable::new(options.immediate_commit);

    let inner = Arc::new_cyclic(|weak: &Weak<RecordInner>| {
      let deps = vec![
        fields.subscribe(),
        baseline.subscribe(),
        immediate_commit.subscribe(),
      ];
      let auto_commit = Self::spawn_auto_commit(weak.clone(), deps, &options);

      RecordInner {
        client,
        options,
        fields,
        baseline,
        immediate_commit,
        auto_commit,
      }
    });

    Self { inner }
  }

  fn spawn_auto_commit(
    record: Weak<RecordInner>,
    deps: Vec<Dependency>,
    options: &RecordOptions,
  ) -> Option<JoinHandle<()>> {
    let task = reactive::throttled_effect(deps, options.rate_limit, move || {
      let record = record.clone();
      async move {
        let Some(inner) = record.upgrade() else {
          return ControlFlow::Break(());
        };
        Record { inner }.commit_if_ready().await;
        ControlFlow::Continue(())
      }
    });

    if task.is_none() && options.immediate_commit {
      warn!("no Tokio runtime, immediate commit disabled for this record");
    }
    task
  }

  async fn commit_if_ready(&self) {
    if !(self.is_immediate_commit() && self.is_dirty() && self.is_valid()) {
      return;
    }
    debug!(id = ?self.id(), "auto-committing record");
    if let Err(e) = self.commit(false).await {
      warn!(id = ?self.id(), error = %e, "auto-commit failed");
    }
  }

  pub fn options(&self) -> &RecordOptions {
    &self.inner.options
  }

  /// Identifying-field value, if configured and set.
  pub fn id(&self) -> Option<Id> {
    let field = self.inner.options.id.as_deref()?;
    self.inner.fields.with(|item| Id::of(item, field))
  }

  pub fn get(&self, field: &str) -> Option<Value> {
    self.inner.fields.with(|item| item.get(field).cloned())
  }

  /// Write one field. Writing an equal value is not a change.
  pub fn set(&self, field: &str, value: impl Into<Value>) {
    let value = value.into();
    self.inner.fields.update(|item| {
      if item.get(field) == Some(&value) {
        return false;
      }
      item.insert(field.to_string(), value);
      true
    });
  }

  /// Copy of all fields.
  pub fn data(&self) -> Item {
    self.inner.fields.read()
  }

  /// Whether the fields differ from the last committed state.
  pub fn is_dirty(&self) -> bool {
    self.inner.baseline.with(|baseline| match baseline {
      None => true,
      Some(committed) => *committed != self.inner.fields.with(fingerprint),
    })
  }

  /// Every currently failing validation.
  pub fn errors(&self) -> Vec<ValidationFailure> {
    self.inner.fields.with(|item| {
      self
        .inner
        .options
        .validators
        .iter()
        .flat_map(|(field, rules)| {
          rules
            .iter()
            .filter_map(move |rule| rule.validate(field, item.get(field)))
        })
        .collect()
    })
  }

  pub fn is_valid(&self) -> bool {
    self.errors().is_empty()
  }

  pub fn is_immediate_commit(&self) -> bool {
    self.inner.immediate_commit.read()
  }

  pub fn set_immediate_commit(&self, enabled: bool) {
    self.inner.immediate_commit.write(enabled);
  }

  /// Force the record dirty until the next commit or map.
  pub fn mark_dirty(&self) {
    self.inner.baseline.write(None);
  }

  /// Take the current fields as the committed state.
  pub fn mark_clean(&self) {
    let current = self.inner.fields.with(fingerprint);
    self.inner.baseline.write(Some(current));
  }

  /// Merge `data` into the fields and reset dirty state.
  pub fn map(&self, data: &Item) -> &Self {
    self.inner.fields.update(|item| {
      let mut changed = false;
      for (key, value) in data {
        if item.get(key) != Some(value) {
          item.insert(key.clone(), value.clone());
          changed = true;
        }
      }
      changed
    });
    self.mark_clean();
    self
  }

  /// Save to the resource: `put` when the record has an id, else `post`.
  ///
  /// Unless `allow_invalid` is set, an invalid record fails with
  /// [`Error::Validation`] without contacting the resource.
  pub async fn commit(&self, allow_invalid: bool) -> Result<Record> {
    if !allow_invalid {
      let errors = self.errors();
      if !errors.is_empty() {
        return Err(Error::Validation(errors));
      }
    }

    let data = self.data();
    let saved = match self.id() {
      Some(id) => {
        info!(%id, "updating record");
        self.inner.client.put(&data).await?
      }
      None => {
        info!("creating record");
        self.inner.client.post(&data).await?
      }
    };

    self.map(&saved);
    Ok(self.clone())
  }

  /// Reload fields from the resource.
  pub async fn fetch(&self) -> Result<Record> {
    let id = self.require_id("fetch")?;
    let data = self
      .inner
      .client
      .get(&id)
      .await?
      .ok_or(Error::NotFound(id))?;
    self.map(&data);
    Ok(self.clone())
  }

  /// Delete from the resource, then clear the id locally.
  pub async fn del(&self) -> Result<()> {
    let id = self.require_id("del")?;
    self.inner.client.del(&id).await?;
    info!(%id, "deleted record");

    if let Some(field) = self.inner.options.id.as_deref() {
      self.set(field, Value::Null);
    }
    // Destroyed: nothing left to commit
    self.mark_clean();
    Ok(())
  }

  fn require_id(&self, op: &str) -> Result<Id> {
    self
      .id()
      .ok_or_else(|| Error::Argument(format!("{} requires the record to have an id", op)))
  }

  /// Change notifications for this record's fields.
  pub fn subscribe(&self) -> Dependency {
    self.inner.fields.subscribe()
  }

  /// Whether both handles refer to the same record.
  pub fn ptr_eq(a: &Record, b: &Record) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
  }
}

impl fmt::Debug for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Record")
      .field("data", &self.data())
      .field("dirty", &self.is_dirty())
      .finish()
  }
}

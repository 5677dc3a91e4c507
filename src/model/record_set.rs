use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resource::{Id, Item, ResourceClient};

use super::options::{IndexSpec, RecordOptions};
use super::reactive::{Dependency, Observable};
use super::record::Record;

/// Lookup built from a record set's current contents.
///
/// Keys are typed: `1` and `"1"` are different keys.
#[derive(Debug, Clone)]
pub enum Index {
  Single(HashMap<String, Record>),
  Compound(HashMap<String, HashMap<String, Record>>),
}

impl Index {
  /// Record under `key` in a single-key index.
  pub fn get(&self, key: impl Into<Value>) -> Option<&Record> {
    let key = index_key(Some(key.into()))?;
    match self {
      Self::Single(map) => map.get(&key),
      Self::Compound(_) => None,
    }
  }

  /// Record under `first`/`second` in a compound index.
  pub fn get_pair(&self, first: impl Into<Value>, second: impl Into<Value>) -> Option<&Record> {
    let (first, second) = (index_key(Some(first.into()))?, index_key(Some(second.into()))?);
    match self {
      Self::Single(_) => None,
      Self::Compound(map) => map.get(&first)?.get(&second),
    }
  }

  /// Top-level keys, in no particular order.
  pub fn keys(&self) -> Vec<Value> {
    let raw: Vec<&String> = match self {
      Self::Single(map) => map.keys().collect(),
      Self::Compound(map) => map.keys().collect(),
    };
    raw
      .into_iter()
      .filter_map(|key| serde_json::from_str(key).ok())
      .collect()
  }
}

/// Index key for a field value: its JSON text, so values of different types
/// never share a slot. `null` and missing values are not indexed.
fn index_key(value: Option<Value>) -> Option<String> {
  match value? {
    Value::Null => None,
    other => serde_json::to_string(&other).ok(),
  }
}

/// Ordered, indexed collection of records sharing one resource client.
pub struct RecordSet {
  client: Arc<dyn ResourceClient>,
  options: Arc<RecordOptions>,
  records: Observable<Vec<Record>>,
}

impl RecordSet {
  pub fn new(data: Vec<Item>, client: Arc<dyn ResourceClient>, options: RecordOptions) -> Self {
    let options = Arc::new(options);
    let records = data
      .into_iter()
      .map(|item| Record::new(item, Arc::clone(&client), Arc::clone(&options)))
      .collect();

    Self {
      client,
      options,
      records: Observable::new(records),
    }
  }

  pub fn options(&self) -> &RecordOptions {
    &self.options
  }

  /// Handles to the records, in order.
  pub fn records(&self) -> Vec<Record> {
    self.records.read()
  }

  pub fn len(&self) -> usize {
    self.records.with(Vec::len)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Change notifications for the sequence (insertions and removals).
  pub fn subscribe(&self) -> Dependency {
    self.records.subscribe()
  }

  /// Record with the given id; the last one wins on duplicates.
  pub fn find(&self, id: &Id) -> Option<Record> {
    self.options.id.as_ref()?;
    self.records.with(|records| {
      records
        .iter()
        .rev()
        .find(|r| r.id().as_ref() == Some(id))
        .cloned()
    })
  }

  /// The id index; empty when no identifying field is configured.
  pub fn id_index(&self) -> HashMap<Id, Record> {
    if self.options.id.is_none() {
      return HashMap::new();
    }
    self.records.with(|records| {
      records
        .iter()
        .filter_map(|r| r.id().map(|id| (id, r.clone())))
        .collect()
    })
  }

  /// Index by name: `"id"`, a single field, or `"first:second"`.
  pub fn index(&self, name: &str) -> Option<Index> {
    if let Some(id_field) = self.options.id.as_deref() {
      if name == "id" || name == id_field {
        return Some(self.single_index(id_field));
      }
    }

    let spec = self.options.indexes.iter().find(|spec| spec.name() == name)?;
    Some(match spec {
      IndexSpec::Single(field) => self.single_index(field),
      IndexSpec::Compound(first, second) => self.compound_index(first, second),
    })
  }

  fn single_index(&self, field: &str) -> Index {
    let map = self.records.with(|records| {
      records
        .iter()
        .filter_map(|r| index_key(r.get(field)).map(|key| (key, r.clone())))
        .collect()
    });
    Index::Single(map)
  }

  fn compound_index(&self, first: &str, second: &str) -> Index {
    let mut map: HashMap<String, HashMap<String, Record>> = HashMap::new();
    self.records.with(|records| {
      for record in records {
        let (Some(a), Some(b)) = (index_key(record.get(first)), index_key(record.get(second)))
        else {
          continue;
        };
        map.entry(a).or_default().insert(b, record.clone());
      }
    });
    Index::Compound(map)
  }

  fn push(&self, record: Record) {
    self.records.update(|records| {
      records.push(record);
      true
    });
  }

  /// Bring the set in line with `data`: drop records whose id is absent from
  /// it, then update matching records in place and append the rest, in
  /// `data` order. Records without an id are kept.
  pub fn map(&self, data: &[Item]) -> &Self {
    if let Some(id_field) = self.options.id.as_deref() {
      let incoming: HashSet<Id> = data
        .iter()
        .filter_map(|item| Id::of(item, id_field))
        .collect();

      self.records.update(|records| {
        let before = records.len();
        records.retain(|r| r.id().map_or(true, |id| incoming.contains(&id)));
        debug!(removed = before - records.len(), "mapped record set");
        records.len() != before
      });
    }

    for item in data {
      let existing = self
        .options
        .id
        .as_deref()
        .and_then(|field| Id::of(item, field))
        .and_then(|id| self.find(&id));

      match existing {
        Some(record) => {
          record.map(item);
        }
        None => self.push(Record::new(
          item.clone(),
          Arc::clone(&self.client),
          Arc::clone(&self.options),
        )),
      }
    }
    self
  }

  /// Commit every dirty record concurrently.
  ///
  /// Each record's outcome is reported on its own; one failure does not stop
  /// the others.
  pub async fn commit(&self) -> Vec<Result<Record>> {
    let dirty: Vec<Record> = self
      .records()
      .into_iter()
      .filter(Record::is_dirty)
      .collect();

    debug!(count = dirty.len(), "committing dirty records");
    join_all(dirty.iter().map(|r| r.commit(false))).await
  }

  /// Replace the contents with the remote collection.
  pub async fn fetch(&self) -> Result<&Self> {
    let data = self.client.list().await?;
    Ok(self.map(&data))
  }

  /// Append a new, uncommitted record.
  pub fn create(&self, data: Item) -> Record {
    let record = Record::new(data, Arc::clone(&self.client), Arc::clone(&self.options));
    self.push(record.clone());
    record
  }

  /// Delete the record with `id` remotely and remove it from the set.
  pub async fn del(&self, id: Option<&Id>) -> Result<Record> {
    let id = id.ok_or_else(|| Error::Argument("\"id\" argument is required".to_string()))?;
    let record = self.find(id).ok_or_else(|| Error::NotFound(id.clone()))?;

    record.del().await?;

    self.records.update(|records| {
      let before = records.len();
      records.retain(|r| !Record::ptr_eq(r, &record));
      records.len() != before
    });
    Ok(record)
  }
}

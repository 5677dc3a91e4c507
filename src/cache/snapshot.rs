use chrono::{DateTime, Utc};

use crate::resource::{position_of, Id, Item};

/// Last known server state of a collection plus the moment it goes stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub items: Vec<Item>,
  pub expires_at: DateTime<Utc>,
}

impl Snapshot {
  pub fn new(items: Vec<Item>, expires_at: DateTime<Utc>) -> Self {
    Self { items, expires_at }
  }

  pub fn find(&self, id_field: &str, id: &Id) -> Option<&Item> {
    position_of(&self.items, id_field, id).map(|i| &self.items[i])
  }

  pub fn append(&mut self, item: Item) {
    self.items.push(item);
  }

  /// Replace the item with the same id, or append it if there is none.
  pub fn upsert(&mut self, id_field: &str, item: Item) {
    match Id::of(&item, id_field).and_then(|id| position_of(&self.items, id_field, &id)) {
      Some(index) => self.items[index] = item,
      None => self.items.push(item),
    }
  }

  /// Returns whether an item was removed.
  pub fn remove(&mut self, id_field: &str, id: &Id) -> bool {
    match position_of(&self.items, id_field, id) {
      Some(index) => {
        self.items.remove(index);
        true
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn item(v: serde_json::Value) -> Item {
    v.as_object().cloned().unwrap()
  }

  #[test]
  fn test_upsert_replaces_in_place() {
    let mut snapshot = Snapshot::new(
      vec![item(json!({"id": 1, "n": "a"})), item(json!({"id": 2, "n": "b"}))],
      Utc::now(),
    );

    snapshot.upsert("id", item(json!({"id": 1, "n": "z"})));
    assert_eq!(snapshot.items[0]["n"], "z");
    assert_eq!(snapshot.items.len(), 2);

    snapshot.upsert("id", item(json!({"id": 3, "n": "c"})));
    assert_eq!(snapshot.items.len(), 3);
  }

  #[test]
  fn test_remove_missing_keeps_items() {
    let mut snapshot = Snapshot::new(vec![item(json!({"id": 1}))], Utc::now());
    assert!(!snapshot.remove("id", &Id::Num(5)));
    assert_eq!(snapshot.items.len(), 1);
    assert!(snapshot.remove("id", &Id::Num(1)));
    assert!(snapshot.items.is_empty());
  }
}

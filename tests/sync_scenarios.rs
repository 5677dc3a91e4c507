use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use restbind::cache::{CachedClient, MemoryStore, PersistentCachedClient};
use restbind::clock::ManualClock;
use restbind::model::{RecordOptions, RecordSet, Validator};
use restbind::resource::{Id, Item, ResourceClient, StubClient};
use serde_json::json;

fn todo(i: usize) -> Item {
  json!({"id": i, "title": format!("todo {}", i), "done": false})
    .as_object()
    .cloned()
    .unwrap()
}

fn item(v: serde_json::Value) -> Item {
  v.as_object().cloned().unwrap()
}

fn clock() -> ManualClock {
  ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
}

#[tokio::test]
async fn test_record_set_over_memory_cache() {
  let stub = StubClient::new(3, todo);
  let cached = Arc::new(CachedClient::new(stub.clone(), Duration::minutes(5)));
  let set = RecordSet::new(Vec::new(), cached.clone(), RecordOptions::default());

  set.fetch().await.unwrap();
  assert_eq!(set.len(), 3);

  set.find(&Id::Num(1)).unwrap().set("done", true);
  let draft = set.create(item(json!({"title": "write tests"})));
  draft.mark_dirty();

  let results = set.commit().await;
  assert!(results.iter().all(|r| r.is_ok()));
  assert_eq!(draft.id(), Some(Id::Num(3)));

  // Both writes reached the server and the snapshot
  assert_eq!(stub.items().len(), 4);
  assert_eq!(stub.items()[1]["done"], true);
  let listed = cached.list().await.unwrap();
  assert_eq!(listed, stub.items());

  // A second set sees the same state without the server changing
  let other = RecordSet::new(Vec::new(), cached, RecordOptions::default());
  other.fetch().await.unwrap();
  assert_eq!(other.len(), 4);
  assert_eq!(other.find(&Id::Num(3)).unwrap().get("title"), Some(json!("write tests")));
}

#[tokio::test]
async fn test_persistent_snapshot_shared_between_instances() {
  let stub = StubClient::new(2, todo);
  let store = Arc::new(MemoryStore::new());
  let clock = clock();

  let first = PersistentCachedClient::new(stub.clone(), Arc::clone(&store), "todos", Duration::minutes(5))
    .with_clock(Arc::new(clock.clone()));
  first.list().await.unwrap();
  first.post(&item(json!({"title": "third"}))).await.unwrap();
  first.settle().await.unwrap();

  // Changed behind the cache's back
  stub.del(&Id::Num(0)).await.unwrap();

  let second = PersistentCachedClient::new(stub.clone(), Arc::clone(&store), "todos", Duration::minutes(5))
    .with_clock(Arc::new(clock.clone()));
  let ids: Vec<Option<Id>> = second
    .list()
    .await
    .unwrap()
    .iter()
    .map(|i| Id::of(i, "id"))
    .collect();
  assert_eq!(ids, vec![Some(Id::Num(0)), Some(Id::Num(1)), Some(Id::Num(2))]);

  // Past expiry the server state wins
  clock.advance(Duration::minutes(5) + Duration::seconds(1));
  let ids: Vec<Option<Id>> = second
    .list()
    .await
    .unwrap()
    .iter()
    .map(|i| Id::of(i, "id"))
    .collect();
  assert_eq!(ids, vec![Some(Id::Num(1)), Some(Id::Num(2))]);
}

#[tokio::test]
async fn test_delete_through_record_set_and_persistent_cache() {
  let stub = StubClient::new(3, todo);
  let client = Arc::new(
    PersistentCachedClient::new(stub.clone(), MemoryStore::new(), "todos", Duration::minutes(5))
      .with_clock(Arc::new(clock())),
  );
  let set = RecordSet::new(Vec::new(), client.clone(), RecordOptions::default());
  set.fetch().await.unwrap();

  let removed = set.del(Some(&Id::Num(1))).await.unwrap();
  assert_eq!(removed.id(), None);
  client.settle().await.unwrap();

  assert_eq!(set.len(), 2);
  assert!(client.get(&Id::Num(1)).await.unwrap().is_none());
  assert_eq!(client.list().await.unwrap(), stub.items());
}

#[tokio::test]
async fn test_immediate_commit_through_cache() {
  let stub = StubClient::new(2, todo);
  let cached = Arc::new(CachedClient::new(stub.clone(), Duration::minutes(5)));
  let options = RecordOptions::default()
    .validate("title", Validator::required())
    .immediate_commit(true)
    .rate_limit(StdDuration::from_millis(30));
  let set = RecordSet::new(Vec::new(), cached.clone(), options);
  set.fetch().await.unwrap();

  let rec = set.find(&Id::Num(0)).unwrap();
  rec.set("title", "");
  tokio::time::sleep(StdDuration::from_millis(150)).await;
  assert_eq!(stub.items()[0]["title"], "todo 0");
  assert!(rec.is_dirty());

  rec.set("title", "renamed");
  rec.set("done", true);
  tokio::time::sleep(StdDuration::from_millis(250)).await;

  assert!(!rec.is_dirty());
  assert_eq!(stub.items()[0]["title"], "renamed");
  assert_eq!(stub.items()[0]["done"], true);
  let cached_first = cached.get(&Id::Num(0)).await.unwrap().unwrap();
  assert_eq!(cached_first["title"], "renamed");
}

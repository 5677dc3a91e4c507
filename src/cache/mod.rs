//! Caching decorators for resource clients.
//!
//! Both decorators wrap any [`ResourceClient`](crate::resource::ResourceClient)
//! and implement the same trait:
//! - [`CachedClient`] keeps the collection snapshot in memory
//! - [`PersistentCachedClient`] keeps it in a [`KeyValueStore`] so it outlives
//!   the process, degrading to a pass-through when the store is unusable

mod memory;
mod persistent;
mod snapshot;
mod storage;

pub use memory::CachedClient;
pub use persistent::{default_key, PersistentCachedClient};
pub use snapshot::Snapshot;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};

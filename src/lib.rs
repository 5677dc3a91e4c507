//! REST resource clients with write-through caching, and reactive records
//! that track dirtiness, validate and commit themselves.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chrono::Duration;
//! use restbind::cache::CachedClient;
//! use restbind::model::{RecordOptions, RecordSet};
//! use restbind::resource::RestClient;
//!
//! # async fn run() -> restbind::Result<()> {
//! let rest = RestClient::new("http://localhost:3000/todos/")?;
//! let client = CachedClient::new(rest, Duration::minutes(5));
//! let todos = RecordSet::new(Vec::new(), Arc::new(client), RecordOptions::default());
//! todos.fetch().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
mod error;
pub mod model;
pub mod resource;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

//! Error taxonomy shared by clients, caches and records.

use std::fmt;

use crate::model::ValidationFailure;
use crate::resource::Id;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Commit attempted on an invalid record without override
  #[error("record is invalid: {}", Failures(.0))]
  Validation(Vec<ValidationFailure>),

  /// A required argument was missing or unusable
  #[error("invalid argument: {0}")]
  Argument(String),

  /// Lookup against an id that is not known
  #[error("no item with id {0}")]
  NotFound(Id),

  /// Network failure, propagated unchanged
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  /// Server answered with a non-2xx status
  #[error("{method} {url} returned {status}")]
  Status {
    method: &'static str,
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("invalid base url {url}: {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Key-value store failure
  #[error("storage error: {0}")]
  Storage(String),
}

impl Error {
  /// True for failures that came from the remote side.
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::Transport(_) | Self::Status { .. })
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Self::Storage(e.to_string())
  }
}

struct Failures<'a>(&'a [ValidationFailure]);

impl fmt::Display for Failures<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, failure) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}", failure)?;
    }
    Ok(())
  }
}

//! Reactive records and record sets bound to a resource client.
//!
//! A [`Record`] wraps one item, tracks whether it differs from what was last
//! committed, validates its fields and can commit itself automatically. A
//! [`RecordSet`] owns an ordered list of records plus lookups by id and by
//! any configured field.

mod options;
pub mod reactive;
mod record;
mod record_set;

pub use options::{IndexSpec, RecordOptions, ValidationFailure, Validator, DEFAULT_RATE_LIMIT};
pub use record::Record;
pub use record_set::{Index, RecordSet};

//! Storage engine for Hematite
//!
//! A single keyspace of polymorphic values (string, list, stream, sorted
//! set) with per-key expiry, plus the RDB snapshot loader and the geohash
//! codec used by the GEO commands.

pub mod engine;
pub mod geo;
pub mod list;
pub mod rdb;
pub mod sorted_set;
pub mod stream;
pub mod value;

pub use engine::StorageEngine;
pub use sorted_set::SortedSet;
pub use stream::{Stream, StreamEntry, StreamId};
pub use value::{StoredValue, Value, ValueType};

/// Type alias for keys
pub type Key = Vec<u8>;

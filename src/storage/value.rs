//! Value types for the storage engine

use std::collections::VecDeque;
use std::time::SystemTime;

use crate::storage::sorted_set::SortedSet;
use crate::storage::stream::Stream;

/// All value kinds a key can hold
#[derive(Debug, Clone)]
pub enum Value {
    /// String value (bytes)
    String(Vec<u8>),

    /// List value (ordered collection)
    List(VecDeque<Vec<u8>>),

    /// Stream value (append-only id-ordered log)
    Stream(Stream),

    /// Sorted set value (member -> score, iterated in (score, member) order)
    SortedSet(SortedSet),
}

/// Value type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    List,
    Stream,
    SortedSet,
}

/// A stored entry with its optional expiration time.
///
/// The expiration is an absolute wall-clock instant; replacing the entry
/// replaces the timestamp, which is what cancels a previously scheduled
/// deletion.
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The actual value
    pub value: Value,

    /// When the value expires (if ever)
    pub expires_at: Option<SystemTime>,
}

impl Value {
    /// Get the type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Stream(_) => ValueType::Stream,
            Value::SortedSet(_) => ValueType::SortedSet,
        }
    }

    /// Create a string value from bytes
    pub fn string<T: Into<Vec<u8>>>(data: T) -> Self {
        Value::String(data.into())
    }

    /// Create an empty list
    pub fn empty_list() -> Self {
        Value::List(VecDeque::new())
    }

    /// Create an empty stream
    pub fn empty_stream() -> Self {
        Value::Stream(Stream::new())
    }

    /// Create an empty sorted set
    pub fn empty_sorted_set() -> Self {
        Value::SortedSet(SortedSet::new())
    }
}

impl ValueType {
    /// The name reported by the TYPE command
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Stream => "stream",
            ValueType::SortedSet => "zset",
        }
    }
}

impl StoredValue {
    /// Create a new stored value without expiration
    pub fn new(value: Value) -> Self {
        StoredValue { value, expires_at: None }
    }

    /// Create a stored value expiring at an absolute instant
    pub fn expiring_at(value: Value, expires_at: SystemTime) -> Self {
        StoredValue { value, expires_at: Some(expires_at) }
    }

    /// Check if this stored value has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| SystemTime::now() >= expires_at)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::string("hello").value_type(), ValueType::String);
        assert_eq!(Value::empty_list().value_type(), ValueType::List);
        assert_eq!(Value::empty_stream().value_type(), ValueType::Stream);
        assert_eq!(Value::empty_sorted_set().value_type(), ValueType::SortedSet);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ValueType::String.name(), "string");
        assert_eq!(ValueType::SortedSet.name(), "zset");
    }

    #[test]
    fn test_expiration() {
        let stored = StoredValue::expiring_at(
            Value::string("test"),
            SystemTime::now() + Duration::from_secs(60),
        );
        assert!(!stored.is_expired());

        let stored = StoredValue::expiring_at(
            Value::string("test"),
            SystemTime::now() - Duration::from_millis(1),
        );
        assert!(stored.is_expired());

        let stored = StoredValue::new(Value::string("test"));
        assert!(!stored.is_expired());
    }
}

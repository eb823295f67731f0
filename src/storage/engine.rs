//! Main storage engine implementation
//!
//! A single keyspace guarded by one lock. Every typed operation checks the
//! existing value kind first and fails with WRONGTYPE on a mismatch, under
//! the same lock as the mutation it guards. Expired entries are removed
//! lazily on access and by the periodic sweep the event loop runs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{CommandError, HematiteError, Result, StorageError};
use crate::storage::list;
use crate::storage::sorted_set::SortedSet;
use crate::storage::stream::{IdSpec, RangeBound, Stream, StreamEntry, StreamId};
use crate::storage::value::{StoredValue, Value, ValueType};
use crate::storage::Key;

/// An entry imported from an RDB snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedEntry {
    pub key: Key,
    pub value: Vec<u8>,
    /// Absolute expiration in milliseconds since the epoch
    pub expires_at_ms: Option<u64>,
}

/// Main storage engine
pub struct StorageEngine {
    data: RwLock<HashMap<Key, StoredValue>>,
}

impl StorageEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        StorageEngine {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Type of the value at `key`, if the key is live
    pub fn get_type(&self, key: &[u8]) -> Option<ValueType> {
        let mut data = self.data.write().unwrap();
        live_entry(&mut data, key).map(|stored| stored.value.value_type())
    }

    /// GET: string value of a key, None when absent or expired
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::String(bytes) => Ok(Some(bytes.clone())),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    /// SET: install a string value, replacing whatever was there.
    /// A non-positive expiry deletes the key outright.
    pub fn set(&self, key: Key, value: Vec<u8>, expire_ms: Option<i64>) {
        let mut data = self.data.write().unwrap();
        match expire_ms {
            None => {
                data.insert(key, StoredValue::new(Value::String(value)));
            }
            Some(ms) if ms > 0 => {
                let expires_at = SystemTime::now() + Duration::from_millis(ms as u64);
                data.insert(key, StoredValue::expiring_at(Value::String(value), expires_at));
            }
            Some(_) => {
                data.remove(&key);
            }
        }
    }

    /// DEL: returns true when the key existed
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.data.write().unwrap();
        let existed = live_entry(&mut data, key).is_some();
        data.remove(key);
        existed
    }

    /// INCR: increment a decimal string value, creating "1" when absent.
    /// Only non-negative decimal strings are accepted.
    pub fn incr(&self, key: &[u8]) -> Result<i64> {
        let mut data = self.data.write().unwrap();
        let current = match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::String(bytes) => Some(parse_stored_integer(bytes)?),
                _ => return Err(StorageError::WrongType.into()),
            },
            None => None,
        };

        let next = match current {
            Some(n) => n.checked_add(1).ok_or(HematiteError::Command(CommandError::NotInteger))?,
            None => 1,
        };

        match data.get_mut(key) {
            Some(stored) => stored.value = Value::String(next.to_string().into_bytes()),
            None => {
                data.insert(
                    key.to_vec(),
                    StoredValue::new(Value::String(next.to_string().into_bytes())),
                );
            }
        }
        Ok(next)
    }

    /// RPUSH: append values, creating the list on first write.
    /// Returns the list length after the push.
    pub fn rpush(&self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize> {
        let mut data = self.data.write().unwrap();
        let items = list_entry_mut(&mut data, key)?;
        for value in values {
            items.push_back(value);
        }
        Ok(items.len())
    }

    /// LPUSH: prepend values one at a time (last argument ends up first)
    pub fn lpush(&self, key: &[u8], values: Vec<Vec<u8>>) -> Result<usize> {
        let mut data = self.data.write().unwrap();
        let items = list_entry_mut(&mut data, key)?;
        for value in values {
            items.push_front(value);
        }
        Ok(items.len())
    }

    /// LLEN: 0 for a missing key
    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::List(items) => Ok(items.len()),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(0),
        }
    }

    /// LRANGE with negative-index normalization
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::List(items) => Ok(list::lrange(items, start, stop)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// LPOP of a single element
    pub fn lpop_one(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &mut stored.value {
                Value::List(items) => Ok(items.pop_front()),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    /// LPOP with a count: up to `count` elements from the head
    pub fn lpop_many(&self, key: &[u8], count: usize) -> Result<Vec<Vec<u8>>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &mut stored.value {
                Value::List(items) => Ok(list::lpop_many(items, count)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// XADD: append a stream entry, creating the stream on first write
    pub fn xadd(&self, key: &[u8], spec: IdSpec, fields: Vec<Vec<u8>>) -> Result<StreamId> {
        let mut data = self.data.write().unwrap();
        let stream = stream_entry_mut(&mut data, key)?;
        stream.add(spec, fields).map_err(HematiteError::Command)
    }

    /// XRANGE between two bounds
    pub fn xrange(&self, key: &[u8], start: RangeBound, end: RangeBound) -> Result<Vec<StreamEntry>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::Stream(stream) => Ok(stream.range(start, end)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// XREAD: entries strictly newer than `after`
    pub fn xread_after(&self, key: &[u8], after: StreamId) -> Result<Vec<StreamEntry>> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::Stream(stream) => Ok(stream.entries_after(after)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Last id of a stream (0-0 when the key is absent or not a stream)
    pub fn last_stream_id(&self, key: &[u8]) -> StreamId {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(StoredValue { value: Value::Stream(stream), .. }) => stream.last_id(),
            _ => StreamId::ZERO,
        }
    }

    /// ZADD of a single member; true when the member is new
    pub fn zadd(&self, key: &[u8], member: Vec<u8>, score: f64) -> Result<bool> {
        let mut data = self.data.write().unwrap();
        let zset = zset_entry_mut(&mut data, key)?;
        Ok(zset.add(member, score))
    }

    /// ZRANK: rank in (score, member) order
    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>> {
        self.with_zset(key, |zset| zset.rank(member)).map(Option::flatten)
    }

    /// ZRANGE with LRANGE index semantics
    pub fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.with_zset(key, |zset| zset.range(start, stop))
            .map(|opt| opt.unwrap_or_default())
    }

    /// ZCARD: 0 for a missing key
    pub fn zcard(&self, key: &[u8]) -> Result<usize> {
        self.with_zset(key, |zset| zset.len()).map(|opt| opt.unwrap_or(0))
    }

    /// ZSCORE: None when the key or member is absent
    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        self.with_zset(key, |zset| zset.score(member)).map(Option::flatten)
    }

    /// ZREM of a single member; true when it was removed
    pub fn zrem(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &mut stored.value {
                Value::SortedSet(zset) => Ok(zset.remove(member)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(false),
        }
    }

    /// All members with their scores in (score, member) order
    pub fn zmembers(&self, key: &[u8]) -> Result<Vec<(Vec<u8>, f64)>> {
        self.with_zset(key, |zset| {
            zset.iter().map(|(member, score)| (member.to_vec(), score)).collect()
        })
        .map(|opt| opt.unwrap_or_default())
    }

    /// All live keys
    pub fn keys(&self) -> Vec<Key> {
        let mut data = self.data.write().unwrap();
        let expired: Vec<Key> = data
            .iter()
            .filter(|(_, stored)| stored.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            data.remove(key);
        }
        data.keys().cloned().collect()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bulk-load string entries from an RDB import. Entries already expired
    /// at load time are skipped.
    pub fn bulk_load(&self, entries: Vec<ImportedEntry>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut data = self.data.write().unwrap();
        for entry in entries {
            match entry.expires_at_ms {
                Some(at_ms) if at_ms <= now_ms => continue,
                Some(at_ms) => {
                    let expires_at = UNIX_EPOCH + Duration::from_millis(at_ms);
                    data.insert(
                        entry.key,
                        StoredValue::expiring_at(Value::String(entry.value), expires_at),
                    );
                }
                None => {
                    data.insert(entry.key, StoredValue::new(Value::String(entry.value)));
                }
            }
        }
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let mut data = self.data.write().unwrap();
        let expired: Vec<Key> = data
            .iter()
            .filter(|(_, stored)| stored.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            data.remove(key);
        }
        expired.len()
    }

    fn with_zset<F, R>(&self, key: &[u8], f: F) -> Result<Option<R>>
    where
        F: FnOnce(&SortedSet) -> R,
    {
        let mut data = self.data.write().unwrap();
        match live_entry(&mut data, key) {
            Some(stored) => match &stored.value {
                Value::SortedSet(zset) => Ok(Some(f(zset))),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(None),
        }
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Access an entry, removing it first if it has expired
fn live_entry<'a>(
    data: &'a mut HashMap<Key, StoredValue>,
    key: &[u8],
) -> Option<&'a mut StoredValue> {
    if data.get(key).is_some_and(|stored| stored.is_expired()) {
        data.remove(key);
        return None;
    }
    data.get_mut(key)
}

fn list_entry_mut<'a>(
    data: &'a mut HashMap<Key, StoredValue>,
    key: &[u8],
) -> Result<&'a mut std::collections::VecDeque<Vec<u8>>> {
    if live_entry(data, key).is_none() {
        data.insert(key.to_vec(), StoredValue::new(Value::empty_list()));
    }
    match &mut data.get_mut(key).unwrap().value {
        Value::List(items) => Ok(items),
        _ => Err(StorageError::WrongType.into()),
    }
}

fn stream_entry_mut<'a>(
    data: &'a mut HashMap<Key, StoredValue>,
    key: &[u8],
) -> Result<&'a mut Stream> {
    if live_entry(data, key).is_none() {
        data.insert(key.to_vec(), StoredValue::new(Value::empty_stream()));
    }
    match &mut data.get_mut(key).unwrap().value {
        Value::Stream(stream) => Ok(stream),
        _ => Err(StorageError::WrongType.into()),
    }
}

fn zset_entry_mut<'a>(
    data: &'a mut HashMap<Key, StoredValue>,
    key: &[u8],
) -> Result<&'a mut SortedSet> {
    if live_entry(data, key).is_none() {
        data.insert(key.to_vec(), StoredValue::new(Value::empty_sorted_set()));
    }
    match &mut data.get_mut(key).unwrap().value {
        Value::SortedSet(zset) => Ok(zset),
        _ => Err(StorageError::WrongType.into()),
    }
}

/// Stored INCR operands must be plain non-negative decimal strings
fn parse_stored_integer(bytes: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| HematiteError::Command(CommandError::NotInteger))?;
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HematiteError::Command(CommandError::NotInteger));
    }
    s.parse::<i64>()
        .map_err(|_| HematiteError::Command(CommandError::NotInteger))
}

//! Blocked-client registry for BLPOP and XREAD BLOCK
//!
//! Holds a FIFO of parked connections per key plus a lock-free queue of
//! keys whose waiters should be re-checked. Pushes and XADDs enqueue a
//! notification; the event loop drains them and serves waiters strictly in
//! arrival order.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crossbeam::queue::SegQueue;

use crate::commands::NotifyKey;

/// FIFO registries of parked connections, keyed by the key they wait on
#[derive(Default)]
struct Registry {
    lists: HashMap<Vec<u8>, VecDeque<u64>>,
    streams: HashMap<Vec<u8>, VecDeque<u64>>,
}

/// Global blocking manager
pub struct BlockingManager {
    registry: Mutex<Registry>,

    /// Keys with possibly-servable waiters, drained by the event loop
    wake_queue: SegQueue<NotifyKey>,
}

impl BlockingManager {
    pub fn new() -> Self {
        BlockingManager {
            registry: Mutex::new(Registry::default()),
            wake_queue: SegQueue::new(),
        }
    }

    /// Park a connection at the back of a list's waiter FIFO
    pub fn register_list_waiter(&self, key: &[u8], conn_id: u64) {
        let mut registry = self.registry.lock().unwrap();
        registry.lists.entry(key.to_vec()).or_default().push_back(conn_id);
    }

    /// Re-park a woken connection that lost the race, keeping its turn
    pub fn register_list_waiter_front(&self, key: &[u8], conn_id: u64) {
        let mut registry = self.registry.lock().unwrap();
        registry.lists.entry(key.to_vec()).or_default().push_front(conn_id);
    }

    /// Park a connection on every stream key of its XREAD
    pub fn register_stream_waiter(&self, keys: &[Vec<u8>], conn_id: u64) {
        let mut registry = self.registry.lock().unwrap();
        for key in keys {
            registry.streams.entry(key.clone()).or_default().push_back(conn_id);
        }
    }

    /// Oldest list waiter for a key, removed from the FIFO
    pub fn pop_list_waiter(&self, key: &[u8]) -> Option<u64> {
        let mut registry = self.registry.lock().unwrap();
        let waiters = registry.lists.get_mut(key)?;
        let conn_id = waiters.pop_front();
        if waiters.is_empty() {
            registry.lists.remove(key);
        }
        conn_id
    }

    /// All stream waiters for a key, removed from the FIFO
    pub fn take_stream_waiters(&self, key: &[u8]) -> Vec<u64> {
        let mut registry = self.registry.lock().unwrap();
        registry
            .streams
            .remove(key)
            .map(|waiters| waiters.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drop a closing connection from every waiter FIFO
    pub fn unregister_conn(&self, conn_id: u64) {
        let mut registry = self.registry.lock().unwrap();
        prune(&mut registry.lists, conn_id);
        prune(&mut registry.streams, conn_id);
    }

    /// Announce that a key received data
    pub fn notify(&self, key: NotifyKey) {
        self.wake_queue.push(key);
    }

    /// Drain pending notifications
    pub fn drain_notifications(&self) -> Vec<NotifyKey> {
        let mut keys = Vec::new();
        while let Some(key) = self.wake_queue.pop() {
            keys.push(key);
        }
        keys
    }
}

impl Default for BlockingManager {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(map: &mut HashMap<Vec<u8>, VecDeque<u64>>, conn_id: u64) {
    let mut empty_keys = Vec::new();
    for (key, waiters) in map.iter_mut() {
        waiters.retain(|waiter| *waiter != conn_id);
        if waiters.is_empty() {
            empty_keys.push(key.clone());
        }
    }
    for key in empty_keys {
        map.remove(&key);
    }
}

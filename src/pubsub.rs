//! Publish/Subscribe messaging
//!
//! Channel subscriptions only (no pattern matching). Both directions of the
//! registry (channel -> subscribers, subscriber -> channels) live under one
//! lock so they can never diverge.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::protocol::RespFrame;

/// Result of a subscribe/unsubscribe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResult {
    /// The channel affected
    pub channel: Vec<u8>,

    /// Number of channels the connection is subscribed to afterwards
    pub num_subscriptions: usize,
}

/// Bidirectional subscription registry
#[derive(Debug, Default)]
struct Registry {
    /// channel -> subscriber connection ids
    channels: HashMap<Vec<u8>, HashSet<u64>>,

    /// connection id -> subscribed channels
    subscribers: HashMap<u64, HashSet<Vec<u8>>>,
}

/// Manages all pub/sub subscriptions
pub struct PubSubManager {
    registry: Mutex<Registry>,
}

impl PubSubManager {
    /// Create a new pub/sub manager
    pub fn new() -> Self {
        PubSubManager {
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Subscribe a connection to a channel
    pub fn subscribe(&self, conn_id: u64, channel: Vec<u8>) -> SubResult {
        let mut registry = self.registry.lock().unwrap();

        registry
            .channels
            .entry(channel.clone())
            .or_default()
            .insert(conn_id);
        let subscribed = registry.subscribers.entry(conn_id).or_default();
        subscribed.insert(channel.clone());

        SubResult {
            channel,
            num_subscriptions: subscribed.len(),
        }
    }

    /// Unsubscribe a connection from a channel
    pub fn unsubscribe(&self, conn_id: u64, channel: Vec<u8>) -> SubResult {
        let mut registry = self.registry.lock().unwrap();

        if let Some(subscribers) = registry.channels.get_mut(&channel) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                registry.channels.remove(&channel);
            }
        }

        let remaining = match registry.subscribers.get_mut(&conn_id) {
            Some(subscribed) => {
                subscribed.remove(&channel);
                let remaining = subscribed.len();
                if remaining == 0 {
                    registry.subscribers.remove(&conn_id);
                }
                remaining
            }
            None => 0,
        };

        SubResult {
            channel,
            num_subscriptions: remaining,
        }
    }

    /// Connection ids subscribed to a channel
    pub fn subscribers_of(&self, channel: &[u8]) -> Vec<u64> {
        let registry = self.registry.lock().unwrap();
        registry
            .channels
            .get(channel)
            .map(|subscribers| subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of channels a connection is subscribed to
    pub fn subscription_count(&self, conn_id: u64) -> usize {
        let registry = self.registry.lock().unwrap();
        registry
            .subscribers
            .get(&conn_id)
            .map(|subscribed| subscribed.len())
            .unwrap_or(0)
    }

    /// Drop every registration of a closing connection
    pub fn purge_connection(&self, conn_id: u64) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(subscribed) = registry.subscribers.remove(&conn_id) {
            for channel in subscribed {
                if let Some(subscribers) = registry.channels.get_mut(&channel) {
                    subscribers.remove(&conn_id);
                    if subscribers.is_empty() {
                        registry.channels.remove(&channel);
                    }
                }
            }
        }
    }
}

impl Default for PubSubManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The frame delivered to subscribers of a channel
pub fn message_frame(channel: &[u8], payload: &[u8]) -> RespFrame {
    RespFrame::array(vec![
        RespFrame::bulk_string(&b"message"[..]),
        RespFrame::bulk_string(channel),
        RespFrame::bulk_string(payload),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_counts() {
        let pubsub = PubSubManager::new();
        let result = pubsub.subscribe(1, b"news".to_vec());
        assert_eq!(result.num_subscriptions, 1);

        let result = pubsub.subscribe(1, b"sport".to_vec());
        assert_eq!(result.num_subscriptions, 2);

        // Re-subscribing the same channel does not grow the count
        let result = pubsub.subscribe(1, b"news".to_vec());
        assert_eq!(result.num_subscriptions, 2);
    }

    #[test]
    fn test_subscribers_of() {
        let pubsub = PubSubManager::new();
        pubsub.subscribe(1, b"news".to_vec());
        pubsub.subscribe(2, b"news".to_vec());

        let mut subscribers = pubsub.subscribers_of(b"news");
        subscribers.sort_unstable();
        assert_eq!(subscribers, vec![1, 2]);
        assert!(pubsub.subscribers_of(b"empty").is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let pubsub = PubSubManager::new();
        pubsub.subscribe(1, b"news".to_vec());
        pubsub.subscribe(1, b"sport".to_vec());

        let result = pubsub.unsubscribe(1, b"news".to_vec());
        assert_eq!(result.num_subscriptions, 1);
        assert!(pubsub.subscribers_of(b"news").is_empty());

        let result = pubsub.unsubscribe(1, b"sport".to_vec());
        assert_eq!(result.num_subscriptions, 0);
        assert_eq!(pubsub.subscription_count(1), 0);
    }

    #[test]
    fn test_purge_connection() {
        let pubsub = PubSubManager::new();
        pubsub.subscribe(1, b"a".to_vec());
        pubsub.subscribe(1, b"b".to_vec());
        pubsub.subscribe(2, b"a".to_vec());

        pubsub.purge_connection(1);
        assert_eq!(pubsub.subscription_count(1), 0);
        assert_eq!(pubsub.subscribers_of(b"a"), vec![2]);
        assert!(pubsub.subscribers_of(b"b").is_empty());
    }

    #[test]
    fn test_message_frame() {
        let frame = message_frame(b"ch", b"hello");
        assert_eq!(
            crate::protocol::serialize(&frame),
            b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$5\r\nhello\r\n"
        );
    }
}

//! Replication manager
//!
//! Tracks the server's role and, on a master, the registry of connected
//! replicas with their byte accounting: how many bytes of command stream
//! each replica has been sent and how many it has acknowledged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::generate_repl_id;

/// The role of the server in replication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationRole {
    /// This server is a master
    Master,

    /// This server replicates from the given master endpoint
    Replica { host: String, port: u16 },
}

/// Master-side bookkeeping for one connected replica
#[derive(Debug)]
pub struct ReplicaHandle {
    /// Connection id of the replica link
    pub conn_id: u64,

    /// Bytes of command stream written to this replica
    pub sent_bytes: AtomicU64,

    /// Bytes the replica has acknowledged via REPLCONF ACK
    pub acked_bytes: AtomicU64,
}

impl ReplicaHandle {
    fn new(conn_id: u64) -> Self {
        ReplicaHandle {
            conn_id,
            sent_bytes: AtomicU64::new(0),
            acked_bytes: AtomicU64::new(0),
        }
    }

    /// Record bytes written to this replica
    pub fn record_sent(&self, len: u64) {
        self.sent_bytes.fetch_add(len, Ordering::SeqCst);
    }

    pub fn sent(&self) -> u64 {
        self.sent_bytes.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> u64 {
        self.acked_bytes.load(Ordering::SeqCst)
    }
}

/// Main replication manager
pub struct ReplicationManager {
    /// Role fixed at startup from the configuration
    role: ReplicationRole,

    /// Replication id announced in FULLRESYNC and INFO
    repl_id: String,

    /// Connected replicas keyed by connection id (master only)
    replicas: Mutex<HashMap<u64, Arc<ReplicaHandle>>>,

    /// Total bytes of command stream propagated by this master
    master_offset: AtomicU64,
}

impl ReplicationManager {
    /// Create a new replication manager
    pub fn new(role: ReplicationRole) -> Self {
        ReplicationManager {
            role,
            repl_id: generate_repl_id(),
            replicas: Mutex::new(HashMap::new()),
            master_offset: AtomicU64::new(0),
        }
    }

    /// Current role
    pub fn role(&self) -> &ReplicationRole {
        &self.role
    }

    /// Check if this server is a master
    pub fn is_master(&self) -> bool {
        matches!(self.role, ReplicationRole::Master)
    }

    /// Replication id of this server
    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    /// Register a connection as a replica, resetting its byte counters
    pub fn register_replica(&self, conn_id: u64) -> Arc<ReplicaHandle> {
        let handle = Arc::new(ReplicaHandle::new(conn_id));
        self.replicas.lock().unwrap().insert(conn_id, Arc::clone(&handle));
        log::info!("Registered replica on connection {}", conn_id);
        handle
    }

    /// Remove a replica (connection closed)
    pub fn remove_replica(&self, conn_id: u64) -> Option<Arc<ReplicaHandle>> {
        let removed = self.replicas.lock().unwrap().remove(&conn_id);
        if removed.is_some() {
            log::info!("Removed replica on connection {}", conn_id);
        }
        removed
    }

    /// All connected replicas
    pub fn replicas(&self) -> Vec<Arc<ReplicaHandle>> {
        self.replicas.lock().unwrap().values().cloned().collect()
    }

    /// Number of connected replicas
    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Whether a connection is a registered replica
    pub fn is_replica_conn(&self, conn_id: u64) -> bool {
        self.replicas.lock().unwrap().contains_key(&conn_id)
    }

    /// Record an acknowledged offset reported by a replica
    pub fn record_ack(&self, conn_id: u64, offset: u64) {
        if let Some(handle) = self.replicas.lock().unwrap().get(&conn_id) {
            handle.acked_bytes.fetch_max(offset, Ordering::SeqCst);
        }
    }

    /// Advance the master offset by a propagated frame length
    pub fn advance_master_offset(&self, len: u64) {
        self.master_offset.fetch_add(len, Ordering::SeqCst);
    }

    /// Count replicas whose acknowledged offset has reached their target
    pub fn count_acked(&self, targets: &[(u64, u64)]) -> usize {
        let replicas = self.replicas.lock().unwrap();
        targets
            .iter()
            .filter(|(conn_id, target)| {
                replicas
                    .get(conn_id)
                    .map(|handle| handle.acked() >= *target)
                    .unwrap_or(false)
            })
            .count()
    }

    /// INFO replication section body
    pub fn info(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        match &self.role {
            ReplicationRole::Master => {
                lines.push("role:master".to_string());
            }
            ReplicationRole::Replica { .. } => {
                lines.push("role:slave".to_string());
            }
        }
        lines.push(format!("connected_slaves:{}", self.replica_count()));
        lines.push(format!("master_replid:{}", self.repl_id));
        lines.push(format!(
            "master_repl_offset:{}",
            self.master_offset.load(Ordering::SeqCst)
        ));
        lines.join("\r\n") + "\r\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let manager = ReplicationManager::new(ReplicationRole::Master);
        assert!(manager.is_master());

        let manager = ReplicationManager::new(ReplicationRole::Replica {
            host: "127.0.0.1".into(),
            port: 6379,
        });
        assert!(!manager.is_master());
    }

    #[test]
    fn test_replica_registry() {
        let manager = ReplicationManager::new(ReplicationRole::Master);
        let handle = manager.register_replica(7);
        assert_eq!(manager.replica_count(), 1);
        assert!(manager.is_replica_conn(7));

        handle.record_sent(10);
        manager.record_ack(7, 10);
        assert_eq!(handle.acked(), 10);

        // Acks never move backwards
        manager.record_ack(7, 5);
        assert_eq!(handle.acked(), 10);

        manager.remove_replica(7);
        assert_eq!(manager.replica_count(), 0);
    }

    #[test]
    fn test_count_acked() {
        let manager = ReplicationManager::new(ReplicationRole::Master);
        manager.register_replica(1);
        manager.register_replica(2);

        manager.record_ack(1, 100);
        assert_eq!(manager.count_acked(&[(1, 100), (2, 100)]), 1);

        manager.record_ack(2, 150);
        assert_eq!(manager.count_acked(&[(1, 100), (2, 100)]), 2);

        // A replica that disappeared is simply not counted
        manager.remove_replica(1);
        assert_eq!(manager.count_acked(&[(1, 100), (2, 100)]), 1);
    }

    #[test]
    fn test_info_sections() {
        let manager = ReplicationManager::new(ReplicationRole::Master);
        let info = manager.info();
        assert!(info.contains("role:master"));
        assert!(info.contains("master_replid:"));
        assert!(info.contains("master_repl_offset:0"));
    }
}

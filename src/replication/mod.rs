//! Replication support
//!
//! Master-side fan-out bookkeeping (per-replica byte offsets and ACK
//! accounting for WAIT) and the replica-side client that connects to a
//! master, performs the PSYNC handshake and applies the command stream.

pub mod client;
pub mod manager;

pub use client::start_replication_client;
pub use manager::{ReplicaHandle, ReplicationManager, ReplicationRole};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a 40-character replication id
pub fn generate_repl_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_repl_id() {
        let id = generate_repl_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_repl_id(), generate_repl_id());
    }
}

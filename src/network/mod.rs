//! Networking layer
//!
//! Non-blocking TCP accept and per-connection framed I/O, multiplexed by a
//! single event-loop thread in `server.rs`, plus the registry of clients
//! parked on blocking operations.

pub mod blocking;
pub mod connection;
pub mod listener;
pub mod server;

pub use blocking::BlockingManager;
pub use connection::{Connection, Pending};
pub use listener::Listener;
pub use server::Server;

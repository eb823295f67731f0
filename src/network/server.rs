//! Main server implementation
//!
//! A single event-loop thread multiplexes the listener and every client
//! socket: it accepts, reads and dispatches frames in arrival order, serves
//! blocked waiters, enforces blocking and WAIT deadlines, sweeps expired
//! keys, fans mutations out to replicas and reaps closed connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands::acl::UserRegistry;
use crate::commands::{
    self, lists, streams, BlockRequest, CommandContext, CommandName, CommandOutcome, ConnMode,
    Dispatched, NotifyKey, ParsedCommand,
};
use crate::config::Config;
use crate::error::Result;
use crate::protocol::{frame_len, serialize, RespFrame};
use crate::pubsub::PubSubManager;
use crate::replication::client::{start_replication_client, ReplicaContext};
use crate::replication::{ReplicationManager, ReplicationRole};
use crate::storage::rdb::{self, EMPTY_RDB};
use crate::storage::{StorageEngine, StreamEntry};

use super::blocking::BlockingManager;
use super::connection::{Connection, Pending};
use super::listener::Listener;

/// How often expired keys are actively swept
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Idle sleep between event-loop ticks
const IDLE_TICK: Duration = Duration::from_millis(1);

/// Main server struct
pub struct Server {
    listener: Listener,
    connections: HashMap<u64, Connection>,
    next_conn_id: u64,
    storage: Arc<StorageEngine>,
    replication: Arc<ReplicationManager>,
    pubsub: Arc<PubSubManager>,
    users: Arc<UserRegistry>,
    blocking: Arc<BlockingManager>,
    config: Config,
    shutdown: Arc<AtomicBool>,
    last_sweep: Instant,
}

impl Server {
    /// Bind the listener, load the RDB snapshot and assemble the server
    pub fn from_config(config: Config, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let listener = Listener::bind(&config.listen_addr())?;

        let storage = Arc::new(StorageEngine::new());
        let entries = rdb::load_file(&config.dir, &config.dbfilename)?;
        storage.bulk_load(entries);

        let role = match &config.replicaof {
            Some((host, port)) => ReplicationRole::Replica {
                host: host.clone(),
                port: *port,
            },
            None => ReplicationRole::Master,
        };
        let replication = Arc::new(ReplicationManager::new(role));

        Ok(Server {
            listener,
            connections: HashMap::new(),
            next_conn_id: 1,
            storage,
            replication,
            pubsub: Arc::new(PubSubManager::new()),
            users: Arc::new(UserRegistry::new()),
            blocking: Arc::new(BlockingManager::new()),
            config,
            shutdown,
            last_sweep: Instant::now(),
        })
    }

    /// Port the listener actually bound (useful with port 0)
    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }

    /// Run the event loop until shutdown is requested
    pub fn run(&mut self) -> Result<()> {
        if let Some((host, port)) = self.config.replicaof.clone() {
            let ctx = ReplicaContext {
                storage: Arc::clone(&self.storage),
                replication: Arc::clone(&self.replication),
                pubsub: Arc::clone(&self.pubsub),
                users: Arc::clone(&self.users),
                blocking: Arc::clone(&self.blocking),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
            };
            start_replication_client(host, port, ctx);
        }

        log::info!("Server ready to accept connections");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.shutdown_all();
                return Ok(());
            }

            let mut busy = false;
            busy |= self.accept_new();
            busy |= self.read_and_dispatch();
            self.serve_wakeups();
            self.check_pending();
            self.sweep_expiry();
            self.flush_writes();
            self.reap_closed();

            if !busy {
                std::thread::sleep(IDLE_TICK);
            }
        }
    }

    /// Accept every connection currently queued on the listener
    fn accept_new(&mut self) -> bool {
        let mut any = false;
        loop {
            match self.listener.accept() {
                Ok(Some((stream, addr))) => {
                    let id = self.next_conn_id;
                    self.next_conn_id += 1;
                    match Connection::new(id, stream, addr) {
                        Ok(conn) => {
                            log::debug!("Accepted connection {} from {}", id, addr);
                            self.connections.insert(id, conn);
                            any = true;
                        }
                        Err(err) => log::warn!("Failed to set up connection from {}: {}", addr, err),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("Accept failed: {}", err);
                    break;
                }
            }
        }
        any
    }

    /// Read every socket and dispatch complete frames in arrival order
    fn read_and_dispatch(&mut self) -> bool {
        let ids: Vec<u64> = self.connections.keys().copied().collect();
        let mut busy = false;

        for id in ids {
            let read_some = {
                let conn = match self.connections.get_mut(&id) {
                    Some(conn) => conn,
                    None => continue,
                };
                match conn.read() {
                    Ok(any) => any,
                    Err(_) => false, // closing flag already set
                }
            };
            busy |= read_some;

            loop {
                let conn = match self.connections.get_mut(&id) {
                    Some(conn) => conn,
                    None => break,
                };
                // A parked connection answers its blocking reply first;
                // pipelined commands stay buffered until then.
                if conn.pending.is_some() || conn.is_closing() {
                    break;
                }
                if conn.state.mode == ConnMode::Replica {
                    self.consume_replica_frames(id);
                    break;
                }

                let frame = match conn.parse_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("Protocol error on connection {}: {}", id, err);
                        conn.set_closing();
                        break;
                    }
                };
                busy = true;
                self.process_frame(id, frame);
            }
        }
        busy
    }

    /// Dispatch one inbound frame from a client connection
    fn process_frame(&mut self, id: u64, frame: RespFrame) {
        let cmd = ParsedCommand::from_frame(&frame);

        let dispatched = {
            let conn = match self.connections.get_mut(&id) {
                Some(conn) => conn,
                None => return,
            };
            conn.received_bytes += frame_len(&frame) as u64;
            let ctx = CommandContext {
                storage: &self.storage,
                replication: &self.replication,
                pubsub: &self.pubsub,
                users: &self.users,
                config: &self.config,
                conn_id: id,
                received_bytes: conn.received_bytes,
                frame_len: cmd.bytes.len() as u64,
            };
            commands::dispatch(&cmd, &mut conn.state, &ctx)
        };

        self.apply_dispatched(id, dispatched);
    }

    /// Apply everything a dispatch decided: the outcome for this
    /// connection, deliveries to others, replica fan-out and wakeups
    fn apply_dispatched(&mut self, id: u64, dispatched: Dispatched) {
        let Dispatched {
            outcome,
            propagate,
            deliveries,
            notify,
            ..
        } = dispatched;

        match outcome {
            CommandOutcome::Reply(frame) => {
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.send_frame(&frame);
                }
            }
            CommandOutcome::Block(request) => self.park(id, request),
            CommandOutcome::Wait { numreplicas, timeout_ms } => {
                self.start_wait(id, numreplicas, timeout_ms)
            }
            CommandOutcome::FullResync => self.start_full_resync(id),
        }

        for (target, frame) in deliveries {
            if let Some(conn) = self.connections.get_mut(&target) {
                conn.send_frame(&frame);
            }
        }

        for bytes in propagate {
            self.propagate_frame(&bytes);
        }

        for key in notify {
            self.blocking.notify(key);
        }
    }

    /// Park a connection on a blocking operation
    fn park(&mut self, id: u64, request: BlockRequest) {
        let now = Instant::now();
        match request {
            BlockRequest::Blpop { key, timeout_ms } => {
                self.blocking.register_list_waiter(&key, id);
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.pending = Some(Pending::Blpop {
                        key: key.clone(),
                        deadline: timeout_ms.map(|ms| now + Duration::from_millis(ms)),
                    });
                }
                // Serve straight away if the list already has elements
                self.blocking.notify(NotifyKey::List(key));
            }
            BlockRequest::Xread { keys, after, timeout_ms } => {
                self.blocking.register_stream_waiter(&keys, id);
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.pending = Some(Pending::Xread {
                        keys,
                        after,
                        deadline: timeout_ms.map(|ms| now + Duration::from_millis(ms)),
                    });
                }
            }
        }
    }

    /// Enter the WAIT barrier: snapshot each replica's sent offset as its
    /// target, ask every replica for an ack, and park the caller
    fn start_wait(&mut self, id: u64, numreplicas: usize, timeout_ms: u64) {
        let replicas = self.replication.replicas();
        let targets: Vec<(u64, u64)> =
            replicas.iter().map(|replica| (replica.conn_id, replica.sent())).collect();

        let acked = self.replication.count_acked(&targets);
        if numreplicas == 0 || replicas.is_empty() || acked >= numreplicas {
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.send_frame(&RespFrame::Integer(acked as i64));
            }
            return;
        }

        // The GETACK itself is part of the stream each replica must count
        let getack = serialize(&RespFrame::command(&["REPLCONF", "GETACK", "*"]));
        for replica in &replicas {
            if let Some(conn) = self.connections.get_mut(&replica.conn_id) {
                conn.send_raw(&getack);
                replica.record_sent(getack.len() as u64);
            }
        }

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.pending = Some(Pending::Wait {
                numreplicas,
                targets,
                deadline: (timeout_ms > 0)
                    .then(|| Instant::now() + Duration::from_millis(timeout_ms)),
            });
        }
    }

    /// Answer a PSYNC: FULLRESYNC header, the snapshot payload, and the
    /// connection leaves the command loop as a registered replica
    fn start_full_resync(&mut self, id: u64) {
        let header = format!("FULLRESYNC {} 0", self.replication.repl_id());
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.send_frame(&RespFrame::simple_string(header));
            conn.send_frame(&RespFrame::FileDump(EMPTY_RDB.clone()));
            conn.state.mode = ConnMode::Replica;
            conn.received_bytes = 0;
        }
        self.replication.register_replica(id);
    }

    /// Consume frames arriving FROM a replica link. The only expected
    /// shape is [REPLCONF, ACK, <offset>]; anything else is logged and
    /// skipped, and nothing is ever answered.
    fn consume_replica_frames(&mut self, id: u64) {
        loop {
            let conn = match self.connections.get_mut(&id) {
                Some(conn) => conn,
                None => return,
            };
            let frame = match conn.parse_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(err) => {
                    log::warn!("Protocol error on replica link {}: {}", id, err);
                    conn.set_closing();
                    return;
                }
            };

            let cmd = ParsedCommand::from_frame(&frame);
            match cmd.name {
                CommandName::ReplconfAck => {
                    let offset = cmd
                        .args
                        .first()
                        .and_then(|arg| std::str::from_utf8(arg).ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    match offset {
                        Some(offset) => self.replication.record_ack(id, offset),
                        None => log::warn!("Replica {} sent a malformed ACK", id),
                    }
                }
                _ => log::debug!("Ignoring unexpected frame from replica {}: {:?}", id, cmd.name),
            }
        }
    }

    /// Write the original frame bytes of a mutating command to every
    /// registered replica, in issue order
    fn propagate_frame(&mut self, bytes: &[u8]) {
        let replicas = self.replication.replicas();
        if replicas.is_empty() {
            return;
        }
        for replica in &replicas {
            if let Some(conn) = self.connections.get_mut(&replica.conn_id) {
                conn.send_raw(bytes);
                replica.record_sent(bytes.len() as u64);
            }
        }
        self.replication.advance_master_offset(bytes.len() as u64);
    }

    /// Serve waiters for every key that was notified this tick
    fn serve_wakeups(&mut self) {
        for key in self.blocking.drain_notifications() {
            match key {
                NotifyKey::List(key) => self.serve_list_waiters(&key),
                NotifyKey::Stream(key) => self.serve_stream_waiters(&key),
            }
        }
    }

    /// Hand out list elements to parked BLPOP clients, oldest first, one
    /// element per waiter
    fn serve_list_waiters(&mut self, key: &[u8]) {
        loop {
            let conn_id = match self.blocking.pop_list_waiter(key) {
                Some(conn_id) => conn_id,
                None => break,
            };

            let parked_here = self
                .connections
                .get(&conn_id)
                .map(|conn| {
                    matches!(&conn.pending, Some(Pending::Blpop { key: waiting, .. }) if waiting == key)
                })
                .unwrap_or(false);
            if !parked_here {
                // Stale registration of a closed or already-served client
                continue;
            }

            match self.storage.lpop_one(key) {
                Ok(Some(value)) => {
                    if let Some(conn) = self.connections.get_mut(&conn_id) {
                        conn.pending = None;
                        conn.send_frame(&lists::blpop_reply(key, value));
                    }
                }
                _ => {
                    // Spurious wake: the data is already gone. The waiter
                    // keeps its turn at the head of the queue.
                    self.blocking.register_list_waiter_front(key, conn_id);
                    break;
                }
            }
        }
    }

    /// Re-check every XREAD client parked on a stream key
    fn serve_stream_waiters(&mut self, key: &[u8]) {
        for conn_id in self.blocking.take_stream_waiters(key) {
            let pending = match self.connections.get(&conn_id) {
                Some(conn) => conn.pending.clone(),
                None => continue,
            };
            let (keys, after) = match pending {
                Some(Pending::Xread { keys, after, .. }) => (keys, after),
                _ => continue,
            };

            let mut results: Vec<(Vec<u8>, Vec<StreamEntry>)> = Vec::new();
            for (waited_key, after_id) in keys.iter().zip(&after) {
                if let Ok(entries) = self.storage.xread_after(waited_key, *after_id) {
                    if !entries.is_empty() {
                        results.push((waited_key.clone(), entries));
                    }
                }
            }

            if results.is_empty() {
                // Nothing newer after all; keep waiting on this key
                self.blocking.register_stream_waiter(&[key.to_vec()], conn_id);
                continue;
            }

            self.blocking.unregister_conn(conn_id);
            if let Some(conn) = self.connections.get_mut(&conn_id) {
                conn.pending = None;
                conn.send_frame(&streams::xread_reply(results));
            }
        }
    }

    /// Resolve deadlines of parked operations and completed WAIT barriers
    fn check_pending(&mut self) {
        let now = Instant::now();
        let ids: Vec<u64> = self.connections.keys().copied().collect();

        for id in ids {
            let pending = match self.connections.get(&id) {
                Some(conn) => conn.pending.clone(),
                None => continue,
            };

            match pending {
                Some(Pending::Wait { numreplicas, targets, deadline }) => {
                    let acked = self.replication.count_acked(&targets);
                    let expired = deadline.is_some_and(|deadline| now >= deadline);
                    if acked >= numreplicas || expired {
                        if let Some(conn) = self.connections.get_mut(&id) {
                            conn.pending = None;
                            conn.send_frame(&RespFrame::Integer(acked as i64));
                        }
                    }
                }
                Some(Pending::Blpop { deadline: Some(deadline), .. }) if now >= deadline => {
                    self.blocking.unregister_conn(id);
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.pending = None;
                        conn.send_frame(&RespFrame::null_array());
                    }
                }
                Some(Pending::Xread { deadline: Some(deadline), .. }) if now >= deadline => {
                    self.blocking.unregister_conn(id);
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.pending = None;
                        conn.send_frame(&RespFrame::null_array());
                    }
                }
                _ => {}
            }
        }
    }

    /// Actively drop expired keys on a fixed cadence
    fn sweep_expiry(&mut self) {
        if self.last_sweep.elapsed() < EXPIRY_SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();
        let dropped = self.storage.sweep_expired();
        if dropped > 0 {
            log::debug!("Expired {} keys", dropped);
        }
    }

    /// Push buffered output out of every socket
    fn flush_writes(&mut self) {
        for conn in self.connections.values_mut() {
            if conn.has_pending_writes() {
                if let Err(err) = conn.flush() {
                    log::debug!("Write failed on connection {}: {}", conn.id, err);
                }
            }
        }
    }

    /// Tear down closed connections and purge every registry they touch
    fn reap_closed(&mut self) {
        let closing: Vec<u64> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_closing())
            .map(|(id, _)| *id)
            .collect();

        for id in closing {
            if let Some(mut conn) = self.connections.remove(&id) {
                conn.close();
                log::debug!("Closed connection {} from {}", id, conn.addr);
            }
            self.pubsub.purge_connection(id);
            self.blocking.unregister_conn(id);
            self.replication.remove_replica(id);
        }
    }

    /// Graceful shutdown: flush what we can and close every socket
    fn shutdown_all(&mut self) {
        log::info!("Shutting down, closing {} connections", self.connections.len());
        for conn in self.connections.values_mut() {
            let _ = conn.flush();
            conn.close();
        }
        self.connections.clear();
    }
}

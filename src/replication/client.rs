//! Replica-side replication client
//!
//! Runs in its own thread next to the listening server: connects to the
//! configured master with a bounded linear back-off, performs the PSYNC
//! handshake, receives the snapshot and then applies the live command
//! stream with replies suppressed (except REPLCONF GETACK).

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::commands::acl::UserRegistry;
use crate::commands::{self, CommandContext, CommandOutcome, ConnState, ParsedCommand};
use crate::config::Config;
use crate::error::{HematiteError, Result};
use crate::network::BlockingManager;
use crate::protocol::{frame_len, serialize, RespFrame, RespParser};
use crate::pubsub::PubSubManager;
use crate::replication::ReplicationManager;
use crate::storage::StorageEngine;

/// Connection attempts before the client gives up
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Linear back-off unit between attempts
const RETRY_STEP: Duration = Duration::from_millis(100);

/// Poll interval of the apply loop, so shutdown stays responsive
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything the replication client needs from the server
pub struct ReplicaContext {
    pub storage: Arc<StorageEngine>,
    pub replication: Arc<ReplicationManager>,
    pub pubsub: Arc<PubSubManager>,
    pub users: Arc<UserRegistry>,
    pub blocking: Arc<BlockingManager>,
    pub config: Config,
    pub shutdown: Arc<AtomicBool>,
}

/// Spawn the background replication client
pub fn start_replication_client(host: String, port: u16, ctx: ReplicaContext) -> JoinHandle<()> {
    thread::spawn(move || {
        log::info!("Replication client starting for master {}:{}", host, port);
        match run_client(&host, port, &ctx) {
            Ok(()) => log::info!("Replication client stopped"),
            Err(err) => log::error!("Replication client failed: {}", err),
        }
    })
}

fn run_client(host: &str, port: u16, ctx: &ReplicaContext) -> Result<()> {
    let mut stream = connect_with_backoff(host, port, &ctx.shutdown)?;
    let mut parser = RespParser::new();

    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    perform_handshake(&mut stream, &mut parser, ctx.config.port)?;
    log::info!("Handshake with master completed");

    let dump = read_reply(&mut stream, &mut parser, true)?;
    match dump {
        RespFrame::FileDump(payload) => {
            log::info!("Received {} byte snapshot from master", payload.len());
        }
        other => {
            return Err(HematiteError::Replication(format!(
                "Expected snapshot payload, got {:?}",
                other
            )))
        }
    }

    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    apply_command_stream(stream, parser, ctx)
}

/// Connect with a linear back-off, bounded number of attempts
fn connect_with_backoff(
    host: &str,
    port: u16,
    shutdown: &AtomicBool,
) -> Result<TcpStream> {
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        if shutdown.load(Ordering::SeqCst) {
            return Err(HematiteError::Replication("Shutdown during connect".into()));
        }
        match TcpStream::connect((host, port)) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                log::warn!(
                    "Connection attempt {}/{} to master failed: {}",
                    attempt,
                    MAX_CONNECT_ATTEMPTS,
                    err
                );
                thread::sleep(RETRY_STEP * attempt);
            }
        }
    }
    Err(HematiteError::Replication(format!(
        "Could not reach master {}:{} after {} attempts",
        host, port, MAX_CONNECT_ATTEMPTS
    )))
}

/// PING, REPLCONF listening-port, REPLCONF capa, PSYNC; each step checks
/// the first whitespace-separated word of the simple-string reply
fn perform_handshake(
    stream: &mut TcpStream,
    parser: &mut RespParser,
    own_port: u16,
) -> Result<()> {
    let port = own_port.to_string();
    let steps: [(Vec<&str>, &str); 4] = [
        (vec!["PING"], "PONG"),
        (vec!["REPLCONF", "listening-port", port.as_str()], "OK"),
        (vec!["REPLCONF", "capa", "psync2"], "OK"),
        (vec!["PSYNC", "?", "-1"], "FULLRESYNC"),
    ];

    for (tokens, expected) in steps {
        send_command(stream, &tokens)?;
        let reply = read_reply(stream, parser, false)?;
        let text = match &reply {
            RespFrame::SimpleString(data) => String::from_utf8_lossy(data).into_owned(),
            other => {
                return Err(HematiteError::Replication(format!(
                    "Unexpected handshake reply: {:?}",
                    other
                )))
            }
        };
        let first_word = text.split_whitespace().next().unwrap_or_default();
        if first_word != expected {
            return Err(HematiteError::Replication(format!(
                "Handshake expected {}, master said {}",
                expected, text
            )));
        }
        log::debug!("Handshake step acknowledged: {}", text);
    }
    Ok(())
}

fn send_command(stream: &mut TcpStream, tokens: &[&str]) -> Result<()> {
    let bytes = serialize(&RespFrame::command(tokens));
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}

/// Read one frame (or one file dump) from the master, blocking
fn read_reply(stream: &mut TcpStream, parser: &mut RespParser, file_dump: bool) -> Result<RespFrame> {
    let mut buf = [0u8; 4096];
    loop {
        let parsed = if file_dump { parser.parse_file_dump()? } else { parser.parse()? };
        if let Some(frame) = parsed {
            return Ok(frame);
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                return Err(HematiteError::Replication("Master closed the connection".into()))
            }
            Ok(n) => parser.feed(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Apply the live command stream. Every inbound frame advances the
/// received-bytes counter; replies are suppressed except for commands that
/// must be acknowledged (REPLCONF GETACK), whose reply reports the offset
/// of bytes processed before that frame.
fn apply_command_stream(
    mut stream: TcpStream,
    mut parser: RespParser,
    ctx: &ReplicaContext,
) -> Result<()> {
    let mut state = ConnState::new();
    let mut received_bytes: u64 = 0;
    let mut buf = [0u8; 4096];

    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        match stream.read(&mut buf) {
            Ok(0) => {
                return Err(HematiteError::Replication("Master closed the connection".into()))
            }
            Ok(n) => parser.feed(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }

        while let Some(frame) = parser.parse()? {
            received_bytes += frame_len(&frame) as u64;
            let cmd = ParsedCommand::from_frame(&frame);

            let dispatched = {
                let command_ctx = CommandContext {
                    storage: &ctx.storage,
                    replication: &ctx.replication,
                    pubsub: &ctx.pubsub,
                    users: &ctx.users,
                    config: &ctx.config,
                    conn_id: 0,
                    received_bytes,
                    frame_len: cmd.bytes.len() as u64,
                };
                commands::dispatch(&cmd, &mut state, &command_ctx)
            };

            for key in dispatched.notify {
                ctx.blocking.notify(key);
            }

            if dispatched.should_ack {
                if let CommandOutcome::Reply(reply) = &dispatched.outcome {
                    stream.write_all(&serialize(reply))?;
                    stream.flush()?;
                }
            } else if let CommandOutcome::Reply(reply) = &dispatched.outcome {
                if reply.is_error() {
                    log::debug!(
                        "Suppressed error applying {:?}: {:?}",
                        cmd.name,
                        reply
                    );
                }
            }
        }
    }
}

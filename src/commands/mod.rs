//! Command parsing and dispatch
//!
//! Inbound frames are parsed into a `ParsedCommand` (keeping their original
//! bytes for replication fan-out), then routed through one of three handler
//! tables depending on the connection mode: the default table, the
//! transaction-queuing table, and the subscribed-mode table.

pub mod acl;
pub mod geo;
pub mod lists;
pub mod pubsub;
pub mod replication;
pub mod server;
pub mod sorted_sets;
pub mod streams;
pub mod strings;
pub mod transactions;

use std::collections::VecDeque;

use crate::config::Config;
use crate::error::{CommandError, HematiteError};
use crate::protocol::{serialize, RespFrame};
use crate::pubsub::PubSubManager;
use crate::replication::ReplicationManager;
use crate::storage::{StorageEngine, StreamId};

use acl::UserRegistry;

/// All commands the server understands. Two-word forms are folded into a
/// single name while parsing (`CONFIG GET` -> `ConfigGet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandName {
    Ping,
    Echo,
    Get,
    Set,
    Del,
    Incr,
    Rpush,
    Lpush,
    Llen,
    Lrange,
    Lpop,
    Blpop,
    Type,
    Xadd,
    Xrange,
    XreadStreams,
    XreadBlock,
    Zadd,
    Zrank,
    Zrange,
    Zcard,
    Zscore,
    Zrem,
    Geoadd,
    Geopos,
    Geodist,
    Geosearch,
    Keys,
    ConfigGet,
    InfoReplication,
    Wait,
    Psync,
    ReplconfListeningPort,
    ReplconfCapa,
    ReplconfGetack,
    ReplconfAck,
    Multi,
    Exec,
    Discard,
    Subscribe,
    Unsubscribe,
    Publish,
    Auth,
    AclWhoami,
    AclGetuser,
    AclSetuser,
    /// Synthetic command for frames that are not well-formed commands
    Error,
}

/// A command parsed from an inbound frame
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub name: CommandName,
    /// Arguments following the name token(s)
    pub args: Vec<Vec<u8>>,
    /// Canonical serialization of the original inbound frame
    pub bytes: Vec<u8>,
}

/// Per-connection dispatch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    Normal,
    Transaction,
    Subscribed,
    Replica,
}

/// The dispatch-relevant slice of connection state
#[derive(Debug)]
pub struct ConnState {
    pub mode: ConnMode,
    pub queued: VecDeque<ParsedCommand>,
}

impl ConnState {
    pub fn new() -> Self {
        ConnState {
            mode: ConnMode::Normal,
            queued: VecDeque::new(),
        }
    }
}

impl Default for ConnState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared server state handed to every handler
pub struct CommandContext<'a> {
    pub storage: &'a StorageEngine,
    pub replication: &'a ReplicationManager,
    pub pubsub: &'a PubSubManager,
    pub users: &'a UserRegistry,
    pub config: &'a Config,
    /// Connection the command arrived on
    pub conn_id: u64,
    /// Bytes received on this connection so far, including this frame
    pub received_bytes: u64,
    /// Serialized length of this frame
    pub frame_len: u64,
}

/// A request to park the connection until data arrives or a deadline passes
#[derive(Debug, Clone)]
pub enum BlockRequest {
    /// BLPOP on one key; `timeout_ms` of None waits forever
    Blpop {
        key: Vec<u8>,
        timeout_ms: Option<u64>,
    },

    /// XREAD BLOCK on a set of streams, each with its resolved start id
    Xread {
        keys: Vec<Vec<u8>>,
        after: Vec<StreamId>,
        timeout_ms: Option<u64>,
    },
}

/// A key whose waiters may be unblockable after a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyKey {
    List(Vec<u8>),
    Stream(Vec<u8>),
}

/// What the dispatcher decided to do with a command
#[derive(Debug)]
pub enum CommandOutcome {
    /// Write this reply
    Reply(RespFrame),

    /// Park the connection on a blocking operation
    Block(BlockRequest),

    /// Enter the WAIT barrier
    Wait { numreplicas: usize, timeout_ms: u64 },

    /// PSYNC accepted: perform the full resync and turn the connection
    /// into a replica link
    FullResync,
}

/// Full result of dispatching one command
#[derive(Debug)]
pub struct Dispatched {
    pub outcome: CommandOutcome,

    /// Serialized frames to fan out to every connected replica
    pub propagate: Vec<Vec<u8>>,

    /// Frames to deliver to other connections (pub/sub messages)
    pub deliveries: Vec<(u64, RespFrame)>,

    /// Keys whose blocked waiters should be re-checked
    pub notify: Vec<NotifyKey>,

    /// True when a replica applying the master stream must send the reply
    pub should_ack: bool,
}

impl Dispatched {
    pub fn reply(frame: RespFrame) -> Self {
        Dispatched {
            outcome: CommandOutcome::Reply(frame),
            propagate: Vec::new(),
            deliveries: Vec::new(),
            notify: Vec::new(),
            should_ack: false,
        }
    }

    pub fn outcome(outcome: CommandOutcome) -> Self {
        Dispatched {
            outcome,
            propagate: Vec::new(),
            deliveries: Vec::new(),
            notify: Vec::new(),
            should_ack: false,
        }
    }
}

/// Commands whose original frame is forwarded to replicas
pub fn should_replicate(name: CommandName) -> bool {
    matches!(
        name,
        CommandName::Set
            | CommandName::Incr
            | CommandName::Rpush
            | CommandName::Lpush
            | CommandName::Lpop
            | CommandName::Xadd
            | CommandName::Exec
    )
}

/// Commands a replica must answer even while replies are suppressed
pub fn should_ack(name: CommandName) -> bool {
    matches!(name, CommandName::ReplconfGetack)
}

impl CommandName {
    /// Match a single uppercased token
    fn from_single(token: &str) -> Option<CommandName> {
        Some(match token {
            "PING" => CommandName::Ping,
            "ECHO" => CommandName::Echo,
            "GET" => CommandName::Get,
            "SET" => CommandName::Set,
            "DEL" => CommandName::Del,
            "INCR" => CommandName::Incr,
            "RPUSH" => CommandName::Rpush,
            "LPUSH" => CommandName::Lpush,
            "LLEN" => CommandName::Llen,
            "LRANGE" => CommandName::Lrange,
            "LPOP" => CommandName::Lpop,
            "BLPOP" => CommandName::Blpop,
            "TYPE" => CommandName::Type,
            "XADD" => CommandName::Xadd,
            "XRANGE" => CommandName::Xrange,
            "ZADD" => CommandName::Zadd,
            "ZRANK" => CommandName::Zrank,
            "ZRANGE" => CommandName::Zrange,
            "ZCARD" => CommandName::Zcard,
            "ZSCORE" => CommandName::Zscore,
            "ZREM" => CommandName::Zrem,
            "GEOADD" => CommandName::Geoadd,
            "GEOPOS" => CommandName::Geopos,
            "GEODIST" => CommandName::Geodist,
            "GEOSEARCH" => CommandName::Geosearch,
            "KEYS" => CommandName::Keys,
            "WAIT" => CommandName::Wait,
            "PSYNC" => CommandName::Psync,
            "MULTI" => CommandName::Multi,
            "EXEC" => CommandName::Exec,
            "DISCARD" => CommandName::Discard,
            "SUBSCRIBE" => CommandName::Subscribe,
            "UNSUBSCRIBE" => CommandName::Unsubscribe,
            "PUBLISH" => CommandName::Publish,
            "AUTH" => CommandName::Auth,
            _ => return None,
        })
    }

    /// Match a two-token `FIRST_SECOND` form
    fn from_joined(joined: &str) -> Option<CommandName> {
        Some(match joined {
            "CONFIG_GET" => CommandName::ConfigGet,
            "INFO_REPLICATION" => CommandName::InfoReplication,
            "REPLCONF_LISTENING-PORT" => CommandName::ReplconfListeningPort,
            "REPLCONF_CAPA" => CommandName::ReplconfCapa,
            "REPLCONF_GETACK" => CommandName::ReplconfGetack,
            "REPLCONF_ACK" => CommandName::ReplconfAck,
            "XREAD_STREAMS" => CommandName::XreadStreams,
            "XREAD_BLOCK" => CommandName::XreadBlock,
            "ACL_WHOAMI" => CommandName::AclWhoami,
            "ACL_GETUSER" => CommandName::AclGetuser,
            "ACL_SETUSER" => CommandName::AclSetuser,
            _ => return None,
        })
    }

    /// Lowercase name used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            CommandName::Ping => "ping",
            CommandName::Echo => "echo",
            CommandName::Get => "get",
            CommandName::Set => "set",
            CommandName::Del => "del",
            CommandName::Incr => "incr",
            CommandName::Rpush => "rpush",
            CommandName::Lpush => "lpush",
            CommandName::Llen => "llen",
            CommandName::Lrange => "lrange",
            CommandName::Lpop => "lpop",
            CommandName::Blpop => "blpop",
            CommandName::Type => "type",
            CommandName::Xadd => "xadd",
            CommandName::Xrange => "xrange",
            CommandName::XreadStreams | CommandName::XreadBlock => "xread",
            CommandName::Zadd => "zadd",
            CommandName::Zrank => "zrank",
            CommandName::Zrange => "zrange",
            CommandName::Zcard => "zcard",
            CommandName::Zscore => "zscore",
            CommandName::Zrem => "zrem",
            CommandName::Geoadd => "geoadd",
            CommandName::Geopos => "geopos",
            CommandName::Geodist => "geodist",
            CommandName::Geosearch => "geosearch",
            CommandName::Keys => "keys",
            CommandName::ConfigGet => "config|get",
            CommandName::InfoReplication => "info",
            CommandName::Wait => "wait",
            CommandName::Psync => "psync",
            CommandName::ReplconfListeningPort
            | CommandName::ReplconfCapa
            | CommandName::ReplconfGetack
            | CommandName::ReplconfAck => "replconf",
            CommandName::Multi => "multi",
            CommandName::Exec => "exec",
            CommandName::Discard => "discard",
            CommandName::Subscribe => "subscribe",
            CommandName::Unsubscribe => "unsubscribe",
            CommandName::Publish => "publish",
            CommandName::Auth => "auth",
            CommandName::AclWhoami | CommandName::AclGetuser | CommandName::AclSetuser => "acl",
            CommandName::Error => "error",
        }
    }
}

impl ParsedCommand {
    /// Parse an inbound frame. A frame that is not a non-empty array of
    /// bulk strings becomes a synthetic Error command carrying a message.
    pub fn from_frame(frame: &RespFrame) -> ParsedCommand {
        let bytes = serialize(frame);

        let tokens = match frame {
            RespFrame::Array(Some(items)) if !items.is_empty() => {
                let mut tokens = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        RespFrame::BulkString(Some(data)) => tokens.push(data.clone()),
                        _ => {
                            return ParsedCommand {
                                name: CommandName::Error,
                                args: vec![b"Protocol error: expected bulk string".to_vec()],
                                bytes,
                            }
                        }
                    }
                }
                tokens
            }
            _ => {
                return ParsedCommand {
                    name: CommandName::Error,
                    args: vec![b"Protocol error: expected non-empty array".to_vec()],
                    bytes,
                }
            }
        };

        let first = String::from_utf8_lossy(&tokens[0]).to_uppercase();
        if let Some(name) = CommandName::from_single(&first) {
            return ParsedCommand {
                name,
                args: tokens[1..].to_vec(),
                bytes,
            };
        }

        if tokens.len() >= 2 {
            let second = String::from_utf8_lossy(&tokens[1]).to_uppercase();
            let joined = format!("{}_{}", first, second);
            if let Some(name) = CommandName::from_joined(&joined) {
                return ParsedCommand {
                    name,
                    args: tokens[2..].to_vec(),
                    bytes,
                };
            }
        }

        ParsedCommand {
            name: CommandName::Error,
            args: vec![format!("unknown command '{}'", first).into_bytes()],
            bytes,
        }
    }
}

/// Route a command through the table selected by the connection mode.
/// Replica-mode frames never reach this function; the server consumes them
/// in the replica egress loop.
pub fn dispatch(cmd: &ParsedCommand, state: &mut ConnState, ctx: &CommandContext) -> Dispatched {
    match state.mode {
        ConnMode::Transaction => transactions::dispatch_queuing(cmd, state, ctx),
        ConnMode::Subscribed => pubsub::dispatch_subscribed(cmd, state, ctx),
        ConnMode::Normal | ConnMode::Replica => execute(cmd, state, ctx),
    }
}

/// The default handler table
pub fn execute(cmd: &ParsedCommand, state: &mut ConnState, ctx: &CommandContext) -> Dispatched {
    let args = &cmd.args;
    let mut dispatched = match cmd.name {
        CommandName::Ping => Dispatched::reply(server::ping(args)),
        CommandName::Echo => Dispatched::reply(server::echo(args)),
        CommandName::Keys => Dispatched::reply(server::keys(args, ctx)),
        CommandName::Type => Dispatched::reply(server::key_type(args, ctx)),
        CommandName::Del => Dispatched::reply(server::del(args, ctx)),
        CommandName::ConfigGet => Dispatched::reply(server::config_get(args, ctx)),
        CommandName::InfoReplication => Dispatched::reply(server::info_replication(args, ctx)),
        CommandName::Wait => server::wait(args),

        CommandName::Get => Dispatched::reply(strings::get(args, ctx)),
        CommandName::Set => Dispatched::reply(strings::set(args, ctx)),
        CommandName::Incr => Dispatched::reply(strings::incr(args, ctx)),

        CommandName::Rpush => Dispatched::reply(lists::rpush(args, ctx)),
        CommandName::Lpush => Dispatched::reply(lists::lpush(args, ctx)),
        CommandName::Llen => Dispatched::reply(lists::llen(args, ctx)),
        CommandName::Lrange => Dispatched::reply(lists::lrange(args, ctx)),
        CommandName::Lpop => Dispatched::reply(lists::lpop(args, ctx)),
        CommandName::Blpop => lists::blpop(args, ctx),

        CommandName::Xadd => Dispatched::reply(streams::xadd(args, ctx)),
        CommandName::Xrange => Dispatched::reply(streams::xrange(args, ctx)),
        CommandName::XreadStreams => Dispatched::reply(streams::xread_streams(args, ctx)),
        CommandName::XreadBlock => streams::xread_block(args, ctx),

        CommandName::Zadd => Dispatched::reply(sorted_sets::zadd(args, ctx)),
        CommandName::Zrank => Dispatched::reply(sorted_sets::zrank(args, ctx)),
        CommandName::Zrange => Dispatched::reply(sorted_sets::zrange(args, ctx)),
        CommandName::Zcard => Dispatched::reply(sorted_sets::zcard(args, ctx)),
        CommandName::Zscore => Dispatched::reply(sorted_sets::zscore(args, ctx)),
        CommandName::Zrem => Dispatched::reply(sorted_sets::zrem(args, ctx)),

        CommandName::Geoadd => Dispatched::reply(geo::geoadd(args, ctx)),
        CommandName::Geopos => Dispatched::reply(geo::geopos(args, ctx)),
        CommandName::Geodist => Dispatched::reply(geo::geodist(args, ctx)),
        CommandName::Geosearch => Dispatched::reply(geo::geosearch(args, ctx)),

        CommandName::Multi => Dispatched::reply(transactions::multi(args, state)),
        CommandName::Exec => transactions::exec_without_multi(args),
        CommandName::Discard => transactions::discard_without_multi(args),

        CommandName::Subscribe => pubsub::subscribe(args, state, ctx),
        CommandName::Unsubscribe => pubsub::unsubscribe(args, state, ctx),
        CommandName::Publish => pubsub::publish(args, ctx),

        CommandName::Psync => replication::psync(args),
        CommandName::ReplconfListeningPort => Dispatched::reply(replication::replconf_lp(args)),
        CommandName::ReplconfCapa => Dispatched::reply(replication::replconf_capa(args)),
        CommandName::ReplconfGetack => replication::replconf_getack(args, ctx),
        CommandName::ReplconfAck => Dispatched::reply(RespFrame::ok()),

        CommandName::Auth => Dispatched::reply(acl::auth(args, ctx)),
        CommandName::AclWhoami => Dispatched::reply(acl::whoami(args)),
        CommandName::AclGetuser => Dispatched::reply(acl::getuser(args, ctx)),
        CommandName::AclSetuser => Dispatched::reply(acl::setuser(args, ctx)),

        CommandName::Error => {
            let message = args
                .first()
                .map(|m| String::from_utf8_lossy(m).into_owned())
                .unwrap_or_else(|| "unknown error".to_string());
            Dispatched::reply(RespFrame::error(format!("ERR {}", message)))
        }
    };

    if should_replicate(cmd.name) && !matches!(cmd.name, CommandName::Exec) {
        dispatched.propagate.push(cmd.bytes.clone());
    }
    match cmd.name {
        CommandName::Rpush | CommandName::Lpush => {
            if let Some(key) = args.first() {
                dispatched.notify.push(NotifyKey::List(key.clone()));
            }
        }
        CommandName::Xadd => {
            if let Some(key) = args.first() {
                dispatched.notify.push(NotifyKey::Stream(key.clone()));
            }
        }
        _ => {}
    }
    dispatched.should_ack = should_ack(cmd.name);
    dispatched
}

/// Render an internal error as a RESP error frame
pub fn err_frame(err: HematiteError) -> RespFrame {
    RespFrame::error(err.to_string())
}

/// Reply for a wrong-arity command
pub fn wrong_args(name: CommandName) -> RespFrame {
    err_frame(CommandError::WrongNumberOfArgs(name.label().to_string()).into())
}

/// Interpret an argument as UTF-8, or None
pub fn arg_str(args: &[Vec<u8>], index: usize) -> Option<&str> {
    args.get(index).and_then(|arg| std::str::from_utf8(arg).ok())
}

/// Parse an argument as a signed integer
pub fn arg_i64(args: &[Vec<u8>], index: usize) -> Option<i64> {
    arg_str(args, index)?.parse().ok()
}

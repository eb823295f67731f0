//! Server-level command handlers: PING, ECHO, KEYS, TYPE, DEL, CONFIG GET,
//! INFO REPLICATION and the WAIT barrier entry point.

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{
    arg_str, err_frame, wrong_args, CommandContext, CommandName, CommandOutcome, Dispatched,
};

/// PING
pub fn ping(args: &[Vec<u8>]) -> RespFrame {
    if !args.is_empty() {
        return wrong_args(CommandName::Ping);
    }
    RespFrame::simple_string("PONG")
}

/// ECHO message
pub fn echo(args: &[Vec<u8>]) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Echo);
    }
    RespFrame::bulk_string(args[0].clone())
}

/// KEYS pattern -- only the `*` pattern is supported
pub fn keys(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Keys);
    }
    if args[0] != b"*" {
        return RespFrame::array(Vec::new());
    }
    let keys = ctx.storage.keys();
    RespFrame::array(keys.into_iter().map(RespFrame::bulk_string).collect())
}

/// TYPE key
pub fn key_type(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Type);
    }
    match ctx.storage.get_type(&args[0]) {
        Some(value_type) => RespFrame::simple_string(value_type.name()),
        None => RespFrame::simple_string("none"),
    }
}

/// DEL key [key ...]
pub fn del(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.is_empty() {
        return wrong_args(CommandName::Del);
    }
    let removed = args.iter().filter(|key| ctx.storage.delete(key)).count();
    RespFrame::Integer(removed as i64)
}

/// CONFIG GET parameter [parameter ...]
pub fn config_get(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.is_empty() {
        return wrong_args(CommandName::ConfigGet);
    }
    let mut out = Vec::new();
    for arg in args {
        let name = match std::str::from_utf8(arg) {
            Ok(name) => name.to_ascii_lowercase(),
            Err(_) => continue,
        };
        let value = match name.as_str() {
            "dir" => Some(ctx.config.dir.clone()),
            "dbfilename" => Some(ctx.config.dbfilename.clone()),
            "port" => Some(ctx.config.port.to_string()),
            _ => None,
        };
        if let Some(value) = value {
            out.push(RespFrame::bulk_string(name.into_bytes()));
            out.push(RespFrame::bulk_string(value.into_bytes()));
        }
    }
    RespFrame::array(out)
}

/// INFO REPLICATION
pub fn info_replication(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if !args.is_empty() {
        return wrong_args(CommandName::InfoReplication);
    }
    RespFrame::bulk_string(ctx.replication.info().into_bytes())
}

/// WAIT numreplicas timeout
pub fn wait(args: &[Vec<u8>]) -> Dispatched {
    if args.len() != 2 {
        return Dispatched::reply(wrong_args(CommandName::Wait));
    }
    let numreplicas = arg_str(args, 0).and_then(|s| s.parse::<usize>().ok());
    let timeout_ms = arg_str(args, 1).and_then(|s| s.parse::<u64>().ok());
    match (numreplicas, timeout_ms) {
        (Some(numreplicas), Some(timeout_ms)) => {
            Dispatched::outcome(CommandOutcome::Wait { numreplicas, timeout_ms })
        }
        _ => Dispatched::reply(err_frame(CommandError::NotInteger.into())),
    }
}

//! String command handlers: GET, SET, INCR

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{arg_i64, arg_str, err_frame, wrong_args, CommandContext, CommandName};

/// GET key
pub fn get(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Get);
    }
    match ctx.storage.get(&args[0]) {
        Ok(Some(value)) => RespFrame::bulk_string(value),
        Ok(None) => RespFrame::null_bulk(),
        Err(err) => err_frame(err),
    }
}

/// SET key value [PX milliseconds]
pub fn set(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() < 2 {
        return wrong_args(CommandName::Set);
    }

    let expire_ms = match args.len() {
        2 => None,
        4 => {
            if !arg_str(args, 2).is_some_and(|opt| opt.eq_ignore_ascii_case("px")) {
                return err_frame(CommandError::SyntaxError.into());
            }
            match arg_i64(args, 3) {
                Some(ms) => Some(ms),
                None => return err_frame(CommandError::NotInteger.into()),
            }
        }
        _ => return err_frame(CommandError::SyntaxError.into()),
    };

    ctx.storage.set(args[0].clone(), args[1].clone(), expire_ms);
    RespFrame::ok()
}

/// INCR key
pub fn incr(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Incr);
    }
    match ctx.storage.incr(&args[0]) {
        Ok(value) => RespFrame::Integer(value),
        Err(err) => err_frame(err),
    }
}

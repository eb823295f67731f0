//! List command handlers: RPUSH, LPUSH, LLEN, LRANGE, LPOP, BLPOP

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{
    arg_i64, arg_str, err_frame, wrong_args, BlockRequest, CommandContext, CommandName,
    CommandOutcome, Dispatched,
};

/// RPUSH key value [value ...]
pub fn rpush(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() < 2 {
        return wrong_args(CommandName::Rpush);
    }
    match ctx.storage.rpush(&args[0], args[1..].to_vec()) {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(err) => err_frame(err),
    }
}

/// LPUSH key value [value ...]
pub fn lpush(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() < 2 {
        return wrong_args(CommandName::Lpush);
    }
    match ctx.storage.lpush(&args[0], args[1..].to_vec()) {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(err) => err_frame(err),
    }
}

/// LLEN key
pub fn llen(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Llen);
    }
    match ctx.storage.llen(&args[0]) {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(err) => err_frame(err),
    }
}

/// LRANGE key start stop
pub fn lrange(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 3 {
        return wrong_args(CommandName::Lrange);
    }
    let (start, stop) = match (arg_i64(args, 1), arg_i64(args, 2)) {
        (Some(start), Some(stop)) => (start, stop),
        _ => return err_frame(CommandError::NotInteger.into()),
    };
    match ctx.storage.lrange(&args[0], start, stop) {
        Ok(values) => RespFrame::array(values.into_iter().map(RespFrame::bulk_string).collect()),
        Err(err) => err_frame(err),
    }
}

/// LPOP key [count]
pub fn lpop(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    match args.len() {
        1 => match ctx.storage.lpop_one(&args[0]) {
            Ok(Some(value)) => RespFrame::bulk_string(value),
            Ok(None) => RespFrame::null_bulk(),
            Err(err) => err_frame(err),
        },
        2 => {
            let count = match arg_i64(args, 1) {
                Some(count) if count >= 0 => count as usize,
                _ => return err_frame(CommandError::NotInteger.into()),
            };
            match ctx.storage.lpop_many(&args[0], count) {
                Ok(values) => {
                    RespFrame::array(values.into_iter().map(RespFrame::bulk_string).collect())
                }
                Err(err) => err_frame(err),
            }
        }
        _ => wrong_args(CommandName::Lpop),
    }
}

/// BLPOP key timeout -- timeout is in (possibly fractional) seconds,
/// 0 means wait forever.
///
/// The caller always joins the key's waiter FIFO, even when an element is
/// already present: the wakeup path pops elements in waiter arrival order,
/// so a newcomer can never overtake a client that blocked earlier.
pub fn blpop(args: &[Vec<u8>], ctx: &CommandContext) -> Dispatched {
    if args.len() != 2 {
        return Dispatched::reply(wrong_args(CommandName::Blpop));
    }
    let timeout_secs = match arg_str(args, 1).and_then(|s| s.parse::<f64>().ok()) {
        Some(secs) if secs >= 0.0 => secs,
        _ => return Dispatched::reply(err_frame(CommandError::NotFloat.into())),
    };

    // Reject with WRONGTYPE up front rather than from inside the waiter
    if let Err(err) = ctx.storage.llen(&args[0]) {
        return Dispatched::reply(err_frame(err));
    }

    let timeout_ms = if timeout_secs == 0.0 {
        None
    } else {
        Some((timeout_secs * 1000.0) as u64)
    };
    Dispatched::outcome(CommandOutcome::Block(BlockRequest::Blpop {
        key: args[0].clone(),
        timeout_ms,
    }))
}

/// The two-element [key, value] reply of a satisfied BLPOP
pub fn blpop_reply(key: &[u8], value: Vec<u8>) -> RespFrame {
    RespFrame::array(vec![RespFrame::bulk_string(key), RespFrame::bulk_string(value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::{args, TestCtx};

    #[test]
    fn test_push_and_range() {
        let harness = TestCtx::new();
        assert_eq!(
            rpush(&args(&["l", "a", "b"]), &harness.ctx()),
            RespFrame::Integer(2)
        );
        assert_eq!(
            lpush(&args(&["l", "front"]), &harness.ctx()),
            RespFrame::Integer(3)
        );
        assert_eq!(
            lrange(&args(&["l", "0", "-1"]), &harness.ctx()),
            RespFrame::array(vec![
                RespFrame::bulk_string(&b"front"[..]),
                RespFrame::bulk_string(&b"a"[..]),
                RespFrame::bulk_string(&b"b"[..]),
            ])
        );
        assert_eq!(llen(&args(&["l"]), &harness.ctx()), RespFrame::Integer(3));
        assert_eq!(llen(&args(&["missing"]), &harness.ctx()), RespFrame::Integer(0));
    }

    #[test]
    fn test_lpop_forms() {
        let harness = TestCtx::new();
        rpush(&args(&["l", "a", "b", "c"]), &harness.ctx());

        assert_eq!(
            lpop(&args(&["l"]), &harness.ctx()),
            RespFrame::bulk_string(&b"a"[..])
        );
        assert_eq!(
            lpop(&args(&["l", "5"]), &harness.ctx()),
            RespFrame::array(vec![
                RespFrame::bulk_string(&b"b"[..]),
                RespFrame::bulk_string(&b"c"[..]),
            ])
        );
        assert_eq!(lpop(&args(&["l"]), &harness.ctx()), RespFrame::null_bulk());
    }

    #[test]
    fn test_blpop_parks_with_timeout() {
        let harness = TestCtx::new();
        let dispatched = blpop(&args(&["q", "1.5"]), &harness.ctx());
        match dispatched.outcome {
            CommandOutcome::Block(BlockRequest::Blpop { key, timeout_ms }) => {
                assert_eq!(key, b"q".to_vec());
                assert_eq!(timeout_ms, Some(1500));
            }
            other => panic!("expected block, got {:?}", other),
        }

        // Zero means wait forever
        let dispatched = blpop(&args(&["q", "0"]), &harness.ctx());
        match dispatched.outcome {
            CommandOutcome::Block(BlockRequest::Blpop { timeout_ms, .. }) => {
                assert_eq!(timeout_ms, None);
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_blpop_rejects_bad_timeout_and_wrongtype() {
        let harness = TestCtx::new();
        let dispatched = blpop(&args(&["q", "soon"]), &harness.ctx());
        match dispatched.outcome {
            CommandOutcome::Reply(frame) => {
                assert_eq!(frame, RespFrame::error("ERR value is not a valid float"))
            }
            other => panic!("expected reply, got {:?}", other),
        }

        harness.storage.set(b"s".to_vec(), b"v".to_vec(), None);
        let dispatched = blpop(&args(&["s", "0"]), &harness.ctx());
        match dispatched.outcome {
            CommandOutcome::Reply(frame) => assert!(frame.is_error()),
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_wrongtype_reported() {
        let harness = TestCtx::new();
        harness.storage.set(b"s".to_vec(), b"v".to_vec(), None);
        assert!(rpush(&args(&["s", "x"]), &harness.ctx()).is_error());
        assert!(lrange(&args(&["s", "0", "-1"]), &harness.ctx()).is_error());
    }
}

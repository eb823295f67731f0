//! Sorted set command handlers: ZADD, ZRANK, ZRANGE, ZCARD, ZSCORE, ZREM

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{arg_i64, arg_str, err_frame, wrong_args, CommandContext, CommandName};

/// ZADD key score member
pub fn zadd(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 3 {
        return wrong_args(CommandName::Zadd);
    }
    let score = match arg_str(args, 1).and_then(|s| s.parse::<f64>().ok()) {
        Some(score) => score,
        None => return err_frame(CommandError::NotFloat.into()),
    };
    match ctx.storage.zadd(&args[0], args[2].clone(), score) {
        Ok(is_new) => RespFrame::Integer(is_new as i64),
        Err(err) => err_frame(err),
    }
}

/// ZRANK key member
pub fn zrank(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 2 {
        return wrong_args(CommandName::Zrank);
    }
    match ctx.storage.zrank(&args[0], &args[1]) {
        Ok(Some(rank)) => RespFrame::Integer(rank as i64),
        Ok(None) => RespFrame::null_bulk(),
        Err(err) => err_frame(err),
    }
}

/// ZRANGE key start stop
pub fn zrange(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 3 {
        return wrong_args(CommandName::Zrange);
    }
    let (start, stop) = match (arg_i64(args, 1), arg_i64(args, 2)) {
        (Some(start), Some(stop)) => (start, stop),
        _ => return err_frame(CommandError::NotInteger.into()),
    };
    match ctx.storage.zrange(&args[0], start, stop) {
        Ok(members) => RespFrame::array(members.into_iter().map(RespFrame::bulk_string).collect()),
        Err(err) => err_frame(err),
    }
}

/// ZCARD key
pub fn zcard(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::Zcard);
    }
    match ctx.storage.zcard(&args[0]) {
        Ok(count) => RespFrame::Integer(count as i64),
        Err(err) => err_frame(err),
    }
}

/// ZSCORE key member
pub fn zscore(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 2 {
        return wrong_args(CommandName::Zscore);
    }
    match ctx.storage.zscore(&args[0], &args[1]) {
        Ok(Some(score)) => RespFrame::bulk_string(format_score(score).into_bytes()),
        Ok(None) => RespFrame::null_bulk(),
        Err(err) => err_frame(err),
    }
}

/// ZREM key member
pub fn zrem(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 2 {
        return wrong_args(CommandName::Zrem);
    }
    match ctx.storage.zrem(&args[0], &args[1]) {
        Ok(removed) => RespFrame::Integer(removed as i64),
        Err(err) => err_frame(err),
    }
}

/// Scores print without a trailing ".0" when they are whole numbers
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        format!("{}", score)
    }
}


#[cfg(test)]
mod handler_tests {
    use super::*;
    use crate::commands::testutil::{args, TestCtx};

    #[test]
    fn test_zadd_zscore_zrank() {
        let harness = TestCtx::new();
        assert_eq!(zadd(&args(&["z", "2", "b"]), &harness.ctx()), RespFrame::Integer(1));
        assert_eq!(zadd(&args(&["z", "1", "a"]), &harness.ctx()), RespFrame::Integer(1));
        assert_eq!(zadd(&args(&["z", "1.5", "a"]), &harness.ctx()), RespFrame::Integer(0));

        assert_eq!(
            zscore(&args(&["z", "a"]), &harness.ctx()),
            RespFrame::bulk_string(&b"1.5"[..])
        );
        assert_eq!(zrank(&args(&["z", "a"]), &harness.ctx()), RespFrame::Integer(0));
        assert_eq!(zrank(&args(&["z", "b"]), &harness.ctx()), RespFrame::Integer(1));
        assert_eq!(zrank(&args(&["z", "nope"]), &harness.ctx()), RespFrame::null_bulk());
    }

    #[test]
    fn test_zadd_rejects_bad_score() {
        let harness = TestCtx::new();
        assert_eq!(
            zadd(&args(&["z", "notafloat", "m"]), &harness.ctx()),
            RespFrame::error("ERR value is not a valid float")
        );
    }

    #[test]
    fn test_zrange_zcard_zrem() {
        let harness = TestCtx::new();
        for (score, member) in [("3", "c"), ("1", "a"), ("2", "b")] {
            zadd(&args(&["z", score, member]), &harness.ctx());
        }

        assert_eq!(zcard(&args(&["z"]), &harness.ctx()), RespFrame::Integer(3));
        assert_eq!(
            zrange(&args(&["z", "0", "1"]), &harness.ctx()),
            RespFrame::array(vec![
                RespFrame::bulk_string(&b"a"[..]),
                RespFrame::bulk_string(&b"b"[..]),
            ])
        );
        assert_eq!(zrem(&args(&["z", "b"]), &harness.ctx()), RespFrame::Integer(1));
        assert_eq!(zrem(&args(&["z", "b"]), &harness.ctx()), RespFrame::Integer(0));
        assert_eq!(zcard(&args(&["z"]), &harness.ctx()), RespFrame::Integer(2));
    }
}

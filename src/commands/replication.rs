//! REPLCONF and PSYNC handlers

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{err_frame, wrong_args, CommandContext, CommandName, CommandOutcome, Dispatched};

/// REPLCONF listening-port <port>
pub fn replconf_lp(args: &[Vec<u8>]) -> RespFrame {
    if args.len() != 1 {
        return wrong_args(CommandName::ReplconfListeningPort);
    }
    RespFrame::ok()
}

/// REPLCONF capa <capability> [capa <capability> ...]
pub fn replconf_capa(args: &[Vec<u8>]) -> RespFrame {
    if args.is_empty() {
        return wrong_args(CommandName::ReplconfCapa);
    }
    RespFrame::ok()
}

/// REPLCONF GETACK *
///
/// The reported offset is the number of command-stream bytes processed
/// BEFORE this GETACK frame, hence the subtraction of its own length.
pub fn replconf_getack(args: &[Vec<u8>], ctx: &CommandContext) -> Dispatched {
    if args.len() != 1 || args[0] != b"*" {
        return Dispatched::reply(err_frame(CommandError::SyntaxError.into()));
    }
    let offset = ctx.received_bytes.saturating_sub(ctx.frame_len);
    let mut dispatched = Dispatched::reply(RespFrame::command(&[
        "REPLCONF",
        "ACK",
        &offset.to_string(),
    ]));
    dispatched.should_ack = true;
    dispatched
}

/// PSYNC ? -1: accept the full resync request; the connection then leaves
/// the command loop and becomes a replica link.
pub fn psync(args: &[Vec<u8>]) -> Dispatched {
    if args.len() != 2 {
        return Dispatched::reply(wrong_args(CommandName::Psync));
    }
    Dispatched::outcome(CommandOutcome::FullResync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::{args, reply_of, TestCtx};
    use crate::protocol::serialize;

    #[test]
    fn test_replconf_handshake_replies() {
        assert_eq!(replconf_lp(&args(&["6380"])), RespFrame::ok());
        assert_eq!(replconf_capa(&args(&["psync2"])), RespFrame::ok());
        assert!(replconf_lp(&args(&[])).is_error());
    }

    #[test]
    fn test_getack_subtracts_its_own_frame() {
        let harness = TestCtx::new();
        let getack_len = serialize(&RespFrame::command(&["REPLCONF", "GETACK", "*"])).len() as u64;

        // 120 bytes arrived in total, the GETACK frame included
        let ctx = harness.ctx_with_bytes(120, getack_len);
        let dispatched = replconf_getack(&args(&["*"]), &ctx);
        assert!(dispatched.should_ack);
        assert_eq!(
            reply_of(dispatched),
            RespFrame::command(&["REPLCONF", "ACK", &(120 - getack_len).to_string()])
        );
    }

    #[test]
    fn test_getack_requires_star() {
        let harness = TestCtx::new();
        let dispatched = replconf_getack(&args(&["2"]), &harness.ctx());
        assert!(!dispatched.should_ack);
        assert!(reply_of(dispatched).is_error());
    }

    #[test]
    fn test_psync_requests_full_resync() {
        let dispatched = psync(&args(&["?", "-1"]));
        assert!(matches!(dispatched.outcome, CommandOutcome::FullResync));

        let dispatched = psync(&args(&["?"]));
        assert!(matches!(dispatched.outcome, CommandOutcome::Reply(ref frame) if frame.is_error()));
    }
}

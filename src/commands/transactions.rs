//! MULTI/EXEC/DISCARD and the transaction-queuing handler table

use crate::error::CommandError;
use crate::protocol::RespFrame;

use super::{
    err_frame, execute, wrong_args, BlockRequest, CommandContext, CommandName, CommandOutcome,
    ConnMode, ConnState, Dispatched, ParsedCommand,
};

/// MULTI in normal mode: open a transaction
pub fn multi(args: &[Vec<u8>], state: &mut ConnState) -> RespFrame {
    if !args.is_empty() {
        return wrong_args(CommandName::Multi);
    }
    state.mode = ConnMode::Transaction;
    state.queued.clear();
    RespFrame::ok()
}

/// EXEC in normal mode
pub fn exec_without_multi(args: &[Vec<u8>]) -> Dispatched {
    if !args.is_empty() {
        return Dispatched::reply(wrong_args(CommandName::Exec));
    }
    Dispatched::reply(err_frame(CommandError::ExecWithoutMulti.into()))
}

/// DISCARD in normal mode
pub fn discard_without_multi(args: &[Vec<u8>]) -> Dispatched {
    if !args.is_empty() {
        return Dispatched::reply(wrong_args(CommandName::Discard));
    }
    Dispatched::reply(err_frame(CommandError::DiscardWithoutMulti.into()))
}

/// The handler table used while a transaction is open: EXEC, DISCARD and
/// MULTI are interpreted; every other command is queued verbatim.
pub fn dispatch_queuing(
    cmd: &ParsedCommand,
    state: &mut ConnState,
    ctx: &CommandContext,
) -> Dispatched {
    match cmd.name {
        CommandName::Exec => exec(&cmd.args, state, ctx),
        CommandName::Discard => discard(&cmd.args, state),
        CommandName::Multi => Dispatched::reply(err_frame(CommandError::MultiNested.into())),
        _ => {
            state.queued.push_back(cmd.clone());
            Dispatched::reply(RespFrame::simple_string("QUEUED"))
        }
    }
}

/// EXEC: run the queue in arrival order against the default table and
/// return the collected replies as one array
fn exec(args: &[Vec<u8>], state: &mut ConnState, ctx: &CommandContext) -> Dispatched {
    if !args.is_empty() {
        return Dispatched::reply(wrong_args(CommandName::Exec));
    }

    state.mode = ConnMode::Normal;
    let queued: Vec<ParsedCommand> = std::mem::take(&mut state.queued).into();

    let mut replies = Vec::with_capacity(queued.len());
    let mut propagate = Vec::new();
    let mut deliveries = Vec::new();
    let mut notify = Vec::new();

    for cmd in &queued {
        let dispatched = execute(cmd, state, ctx);
        propagate.extend(dispatched.propagate);
        deliveries.extend(dispatched.deliveries);
        notify.extend(dispatched.notify);
        replies.push(resolve_immediately(dispatched.outcome, ctx));
    }

    Dispatched {
        outcome: CommandOutcome::Reply(RespFrame::array(replies)),
        propagate,
        deliveries,
        notify,
        should_ack: false,
    }
}

/// DISCARD: drop the queue and close the transaction
fn discard(args: &[Vec<u8>], state: &mut ConnState) -> Dispatched {
    if !args.is_empty() {
        return Dispatched::reply(wrong_args(CommandName::Discard));
    }
    state.queued.clear();
    state.mode = ConnMode::Normal;
    Dispatched::reply(RespFrame::ok())
}

/// Inside EXEC nothing may suspend: blocking commands take whatever is
/// available right now or answer as if they timed out, and WAIT reports
/// the current ack count.
fn resolve_immediately(outcome: CommandOutcome, ctx: &CommandContext) -> RespFrame {
    match outcome {
        CommandOutcome::Reply(frame) => frame,
        CommandOutcome::Block(BlockRequest::Blpop { key, .. }) => {
            match ctx.storage.lpop_one(&key) {
                Ok(Some(value)) => crate::commands::lists::blpop_reply(&key, value),
                _ => RespFrame::null_array(),
            }
        }
        CommandOutcome::Block(BlockRequest::Xread { keys, after, .. }) => {
            let mut results = Vec::new();
            for (key, after_id) in keys.iter().zip(&after) {
                if let Ok(entries) = ctx.storage.xread_after(key, *after_id) {
                    if !entries.is_empty() {
                        results.push((key.clone(), entries));
                    }
                }
            }
            crate::commands::streams::xread_reply(results)
        }
        CommandOutcome::Wait { .. } => {
            let acked = ctx
                .replication
                .replicas()
                .iter()
                .filter(|replica| replica.acked() >= replica.sent())
                .count();
            RespFrame::Integer(acked as i64)
        }
        CommandOutcome::FullResync => err_frame(CommandError::SyntaxError.into()),
    }
}

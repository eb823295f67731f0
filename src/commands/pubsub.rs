//! SUBSCRIBE/UNSUBSCRIBE/PUBLISH and the subscribed-mode handler table

use crate::error::CommandError;
use crate::protocol::RespFrame;
use crate::pubsub::message_frame;

use super::{
    err_frame, wrong_args, CommandContext, CommandName, ConnMode, ConnState, Dispatched,
    ParsedCommand,
};

/// SUBSCRIBE channel
pub fn subscribe(args: &[Vec<u8>], state: &mut ConnState, ctx: &CommandContext) -> Dispatched {
    if args.len() != 1 {
        return Dispatched::reply(wrong_args(CommandName::Subscribe));
    }
    let result = ctx.pubsub.subscribe(ctx.conn_id, args[0].clone());
    state.mode = ConnMode::Subscribed;
    Dispatched::reply(RespFrame::array(vec![
        RespFrame::bulk_string(&b"subscribe"[..]),
        RespFrame::bulk_string(result.channel),
        RespFrame::Integer(result.num_subscriptions as i64),
    ]))
}

/// UNSUBSCRIBE channel
pub fn unsubscribe(args: &[Vec<u8>], state: &mut ConnState, ctx: &CommandContext) -> Dispatched {
    if args.len() != 1 {
        return Dispatched::reply(wrong_args(CommandName::Unsubscribe));
    }
    let result = ctx.pubsub.unsubscribe(ctx.conn_id, args[0].clone());
    if result.num_subscriptions == 0 {
        state.mode = ConnMode::Normal;
    }
    Dispatched::reply(RespFrame::array(vec![
        RespFrame::bulk_string(&b"unsubscribe"[..]),
        RespFrame::bulk_string(result.channel),
        RespFrame::Integer(result.num_subscriptions as i64),
    ]))
}

/// PUBLISH channel message
pub fn publish(args: &[Vec<u8>], ctx: &CommandContext) -> Dispatched {
    if args.len() != 2 {
        return Dispatched::reply(wrong_args(CommandName::Publish));
    }
    let subscribers = ctx.pubsub.subscribers_of(&args[0]);
    let message = message_frame(&args[0], &args[1]);
    let deliveries: Vec<(u64, RespFrame)> = subscribers
        .iter()
        .map(|conn_id| (*conn_id, message.clone()))
        .collect();

    let mut dispatched = Dispatched::reply(RespFrame::Integer(subscribers.len() as i64));
    dispatched.deliveries = deliveries;
    dispatched
}

/// The handler table active while a connection is subscribed: only the
/// subscription commands and PING are allowed.
pub fn dispatch_subscribed(
    cmd: &ParsedCommand,
    state: &mut ConnState,
    ctx: &CommandContext,
) -> Dispatched {
    match cmd.name {
        CommandName::Subscribe => subscribe(&cmd.args, state, ctx),
        CommandName::Unsubscribe => unsubscribe(&cmd.args, state, ctx),
        CommandName::Publish => publish(&cmd.args, ctx),
        CommandName::Ping => Dispatched::reply(super::server::ping(&cmd.args)),
        _ => Dispatched::reply(err_frame(
            CommandError::SubscribedRestriction(cmd.name.label().to_string()).into(),
        )),
    }
}

//! Stream command handlers: XADD, XRANGE, XREAD (STREAMS and BLOCK forms)

use crate::error::CommandError;
use crate::protocol::RespFrame;
use crate::storage::stream::{IdSpec, RangeBound};
use crate::storage::{StreamEntry, StreamId};

use super::{
    arg_str, err_frame, wrong_args, BlockRequest, CommandContext, CommandName, CommandOutcome,
    Dispatched,
};

/// XADD key id field value [field value ...]
pub fn xadd(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() < 4 || args.len() % 2 != 0 {
        return wrong_args(CommandName::Xadd);
    }
    let spec = match arg_str(args, 1).and_then(IdSpec::parse) {
        Some(spec) => spec,
        None => return invalid_stream_id(),
    };
    match ctx.storage.xadd(&args[0], spec, args[2..].to_vec()) {
        Ok(id) => RespFrame::bulk_string(id.to_string().into_bytes()),
        Err(err) => err_frame(err),
    }
}

/// XRANGE key start end
pub fn xrange(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 3 {
        return wrong_args(CommandName::Xrange);
    }
    let start = arg_str(args, 1).and_then(RangeBound::parse_start);
    let end = arg_str(args, 2).and_then(RangeBound::parse_end);
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => return invalid_stream_id(),
    };
    match ctx.storage.xrange(&args[0], start, end) {
        Ok(entries) => entries_frame(&entries),
        Err(err) => err_frame(err),
    }
}

/// XREAD STREAMS key [key ...] id [id ...]
pub fn xread_streams(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    let (keys, ids) = match split_streams_args(args) {
        Some(pair) => pair,
        None => return wrong_args(CommandName::XreadStreams),
    };

    let mut after = Vec::with_capacity(ids.len());
    for id in &ids {
        match std::str::from_utf8(id).ok().and_then(StreamId::parse) {
            Some(id) => after.push(id),
            None => return invalid_stream_id(),
        }
    }

    match collect_streams(ctx, &keys, &after) {
        Ok(results) => xread_reply(results),
        Err(frame) => frame,
    }
}

/// XREAD BLOCK timeout STREAMS key [key ...] id [id ...]
/// An id of `$` means "whatever the stream's last id is right now".
pub fn xread_block(args: &[Vec<u8>], ctx: &CommandContext) -> Dispatched {
    if args.len() < 4 {
        return Dispatched::reply(wrong_args(CommandName::XreadBlock));
    }
    let timeout_ms = match arg_str(args, 0).and_then(|s| s.parse::<u64>().ok()) {
        Some(ms) => ms,
        None => return Dispatched::reply(err_frame(CommandError::NotInteger.into())),
    };
    if !arg_str(args, 1).is_some_and(|s| s.eq_ignore_ascii_case("streams")) {
        return Dispatched::reply(err_frame(CommandError::SyntaxError.into()));
    }

    let (keys, ids) = match split_streams_args(&args[2..]) {
        Some(pair) => pair,
        None => return Dispatched::reply(wrong_args(CommandName::XreadBlock)),
    };

    let mut after = Vec::with_capacity(ids.len());
    for (key, id) in keys.iter().zip(&ids) {
        if id.as_slice() == b"$" {
            after.push(ctx.storage.last_stream_id(key));
        } else {
            match std::str::from_utf8(id).ok().and_then(StreamId::parse) {
                Some(id) => after.push(id),
                None => return Dispatched::reply(invalid_stream_id()),
            }
        }
    }

    // Anything newer already in place is returned without blocking
    match collect_streams(ctx, &keys, &after) {
        Ok(results) if !results.is_empty() => Dispatched::reply(xread_reply(results)),
        Ok(_) => Dispatched::outcome(CommandOutcome::Block(BlockRequest::Xread {
            keys,
            after,
            timeout_ms: if timeout_ms == 0 { None } else { Some(timeout_ms) },
        })),
        Err(frame) => Dispatched::reply(frame),
    }
}

/// Split the `key [key ...] id [id ...]` tail of an XREAD
fn split_streams_args(args: &[Vec<u8>]) -> Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    if args.is_empty() || args.len() % 2 != 0 {
        return None;
    }
    let half = args.len() / 2;
    Some((args[..half].to_vec(), args[half..].to_vec()))
}

/// Gather the strictly-newer entries of each requested stream
fn collect_streams(
    ctx: &CommandContext,
    keys: &[Vec<u8>],
    after: &[StreamId],
) -> Result<Vec<(Vec<u8>, Vec<StreamEntry>)>, RespFrame> {
    let mut results = Vec::new();
    for (key, after) in keys.iter().zip(after) {
        match ctx.storage.xread_after(key, *after) {
            Ok(entries) if entries.is_empty() => {}
            Ok(entries) => results.push((key.clone(), entries)),
            Err(err) => return Err(err_frame(err)),
        }
    }
    Ok(results)
}

/// Entries rendered as [[id, [field, value, ...]], ...]
pub fn entries_frame(entries: &[StreamEntry]) -> RespFrame {
    RespFrame::array(
        entries
            .iter()
            .map(|entry| {
                RespFrame::array(vec![
                    RespFrame::bulk_string(entry.id.to_string().into_bytes()),
                    RespFrame::array(
                        entry.fields.iter().map(|f| RespFrame::bulk_string(f.clone())).collect(),
                    ),
                ])
            })
            .collect(),
    )
}

/// The XREAD reply: null when nothing was newer, otherwise one
/// [key, entries] pair per stream that had data
pub fn xread_reply(results: Vec<(Vec<u8>, Vec<StreamEntry>)>) -> RespFrame {
    if results.is_empty() {
        return RespFrame::null_array();
    }
    RespFrame::array(
        results
            .into_iter()
            .map(|(key, entries)| {
                RespFrame::array(vec![RespFrame::bulk_string(key), entries_frame(&entries)])
            })
            .collect(),
    )
}

fn invalid_stream_id() -> RespFrame {
    err_frame(
        CommandError::Generic("Invalid stream ID specified as stream command argument".into())
            .into(),
    )
}

//! Stream value implementation
//!
//! An append-only log of entries keyed by `<millis>-<seq>` ids. Ids are
//! strictly increasing; the special id 0-0 can never be written.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CommandError;

/// A stream entry id: millisecond timestamp plus per-millisecond sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub millis: u64,
    pub seq: u64,
}

/// One entry: id plus its flat field/value payload
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<Vec<u8>>,
}

/// How an XADD caller specified the new entry id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`: timestamp and sequence both auto-generated
    Auto,

    /// `<ms>-*`: explicit timestamp, auto sequence
    AutoSeq(u64),

    /// `<ms>-<seq>`: fully specified
    Explicit(StreamId),
}

/// Stream value: ordered entries plus the id generation state
#[derive(Debug, Clone, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { millis: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { millis: u64::MAX, seq: u64::MAX };

    pub fn new(millis: u64, seq: u64) -> Self {
        StreamId { millis, seq }
    }

    /// Parse a fully specified `<ms>-<seq>` id
    pub fn parse(s: &str) -> Option<Self> {
        let (millis, seq) = s.split_once('-')?;
        Some(StreamId {
            millis: millis.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }

    /// The smallest id strictly greater than this one
    pub fn next(&self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId::new(self.millis + 1, 0)
        } else {
            StreamId::new(self.millis, self.seq + 1)
        }
    }
}

impl Default for StreamId {
    fn default() -> Self {
        StreamId::ZERO
    }
}

impl PartialOrd for StreamId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.millis, self.seq).cmp(&(other.millis, other.seq))
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl IdSpec {
    /// Parse an XADD id argument: `*`, `<ms>-*`, or `<ms>-<seq>`
    pub fn parse(s: &str) -> Option<Self> {
        if s == "*" {
            return Some(IdSpec::Auto);
        }
        let (millis, seq) = s.split_once('-')?;
        let millis: u64 = millis.parse().ok()?;
        if seq == "*" {
            Some(IdSpec::AutoSeq(millis))
        } else {
            Some(IdSpec::Explicit(StreamId::new(millis, seq.parse().ok()?)))
        }
    }
}

/// Bounds accepted by XRANGE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Inclusive(StreamId),
    Exclusive(StreamId),
}

impl RangeBound {
    /// Parse an XRANGE start argument: `-`, `<ms>`, or `<ms>-<seq>`
    pub fn parse_start(s: &str) -> Option<RangeBound> {
        if s == "-" {
            return Some(RangeBound::Inclusive(StreamId::ZERO));
        }
        if let Some(id) = StreamId::parse(s) {
            return Some(RangeBound::Inclusive(id));
        }
        // A bare timestamp covers every sequence at that timestamp
        let millis: u64 = s.parse().ok()?;
        Some(RangeBound::Inclusive(StreamId::new(millis, 0)))
    }

    /// Parse an XRANGE end argument: `+`, `<ms>`, or `<ms>-<seq>`
    pub fn parse_end(s: &str) -> Option<RangeBound> {
        if s == "+" {
            return Some(RangeBound::Inclusive(StreamId::MAX));
        }
        if let Some(id) = StreamId::parse(s) {
            return Some(RangeBound::Inclusive(id));
        }
        let millis: u64 = s.parse().ok()?;
        Some(RangeBound::Exclusive(StreamId::new(millis + 1, 0)))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The id of the most recently inserted entry (0-0 when empty)
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Append an entry, resolving the id spec against the stream state.
    /// Returns the id actually assigned.
    pub fn add(&mut self, spec: IdSpec, fields: Vec<Vec<u8>>) -> Result<StreamId, CommandError> {
        let id = match spec {
            IdSpec::Explicit(id) => {
                if id == StreamId::ZERO {
                    return Err(CommandError::StreamIdZero);
                }
                if id <= self.last_id {
                    return Err(CommandError::StreamIdTooSmall);
                }
                id
            }
            IdSpec::AutoSeq(millis) => self.next_seq_for(millis)?,
            IdSpec::Auto => {
                let now = now_millis();
                if now <= self.last_id.millis && !self.entries.is_empty() {
                    // Clock stands still or ran backwards; keep ids monotonic
                    self.last_id.next()
                } else {
                    StreamId::new(now, 0)
                }
            }
        };

        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Smallest unused sequence number within a caller-supplied timestamp
    fn next_seq_for(&self, millis: u64) -> Result<StreamId, CommandError> {
        if !self.entries.is_empty() && millis < self.last_id.millis {
            return Err(CommandError::StreamIdTooSmall);
        }
        if !self.entries.is_empty() && millis == self.last_id.millis {
            return Ok(self.last_id.next());
        }
        // First entry at this timestamp; 0-0 is reserved
        let seq = if millis == 0 { 1 } else { 0 };
        Ok(StreamId::new(millis, seq))
    }

    /// Entries between two XRANGE bounds, in id order
    pub fn range(&self, start: RangeBound, end: RangeBound) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|entry| {
                let after_start = match start {
                    RangeBound::Inclusive(id) => entry.id >= id,
                    RangeBound::Exclusive(id) => entry.id > id,
                };
                let before_end = match end {
                    RangeBound::Inclusive(id) => entry.id <= id,
                    RangeBound::Exclusive(id) => entry.id < id,
                };
                after_start && before_end
            })
            .cloned()
            .collect()
    }

    /// Entries with id strictly greater than `after` (the XREAD contract)
    pub fn entries_after(&self, after: StreamId) -> Vec<StreamEntry> {
        let start = self.entries.partition_point(|entry| entry.id <= after);
        self.entries[start..].to_vec()
    }
}

//! List operations
//!
//! Index arithmetic for LRANGE-style ranges. Negative indices count from
//! the tail; after normalization an inverted or out-of-bounds range is
//! empty and the stop index is clipped to the last element.

use std::collections::VecDeque;

/// Normalize a possibly negative index against a list length.
/// Returns the clamped non-negative position (which may equal `len`).
fn normalize_index(index: i64, len: usize) -> usize {
    if index < 0 {
        let from_tail = index.unsigned_abs() as usize;
        len.saturating_sub(from_tail)
    } else {
        index as usize
    }
}

/// Resolve an LRANGE-style (start, stop) pair into a concrete half-open
/// range over a list of length `len`. `None` means the range is empty.
pub fn resolve_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }

    let start = normalize_index(start, len);
    let stop = normalize_index(stop, len);

    if start > stop || start >= len {
        return None;
    }

    let stop = stop.min(len - 1);
    Some((start, stop + 1))
}

/// Copy out the elements of an LRANGE query
pub fn lrange(items: &VecDeque<Vec<u8>>, start: i64, stop: i64) -> Vec<Vec<u8>> {
    match resolve_range(start, stop, items.len()) {
        Some((lo, hi)) => items.iter().skip(lo).take(hi - lo).cloned().collect(),
        None => Vec::new(),
    }
}

/// Pop up to `count` elements from the head
pub fn lpop_many(items: &mut VecDeque<Vec<u8>>, count: usize) -> Vec<Vec<u8>> {
    let take = count.min(items.len());
    items.drain(..take).collect()
}

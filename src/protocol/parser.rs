//! RESP protocol parser implementation
//!
//! Incremental parsing of RESP frames. A partial frame is reported as
//! `Ok(None)` without consuming any bytes so the caller can retry once more
//! data has arrived; bytes that cannot be the prefix of any frame fail with
//! a protocol error.

use super::resp::RespFrame;
use crate::error::{HematiteError, Result};

/// Parser state for incremental RESP parsing
pub struct RespParser {
    buffer: Vec<u8>,
    position: usize,
}

impl RespParser {
    /// Create a new parser
    pub fn new() -> Self {
        RespParser {
            buffer: Vec::with_capacity(4096),
            position: 0,
        }
    }

    /// Feed data into the parser
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to parse a complete frame from the buffer
    pub fn parse(&mut self) -> Result<Option<RespFrame>> {
        if self.position >= self.buffer.len() {
            return Ok(None);
        }

        match parse_frame(&self.buffer[self.position..])? {
            Some((frame, consumed)) => {
                self.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Try to parse a file-dump frame ($<len>\r\n<bytes>, no trailing CRLF).
    /// Only valid at the point of a replication full-resync; the generic
    /// `parse` entry point never produces this variant.
    pub fn parse_file_dump(&mut self) -> Result<Option<RespFrame>> {
        if self.position >= self.buffer.len() {
            return Ok(None);
        }

        match parse_file_dump(&self.buffer[self.position..])? {
            Some((frame, consumed)) => {
                self.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Clear the parser buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.position = 0;
    }

    fn advance(&mut self, consumed: usize) {
        self.position += consumed;
        // Compact the buffer once more than half of it is dead space
        if self.position > self.buffer.len() / 2 {
            self.buffer.drain(..self.position);
            self.position = 0;
        }
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a RESP frame from a byte slice.
/// Returns `Some((frame, bytes_consumed))` if a complete frame is found,
/// `None` if the slice holds a valid prefix of a frame.
pub fn parse_frame(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    if data.is_empty() {
        return Ok(None);
    }

    match data[0] {
        b'+' => parse_simple_string(data),
        b'-' => parse_error(data),
        b':' => parse_integer(data),
        b'$' => parse_bulk_string(data),
        b'*' => parse_array(data),
        _ => Err(HematiteError::Protocol(format!(
            "Invalid RESP type byte: 0x{:02x}",
            data[0]
        ))),
    }
}

/// Parse a file dump: $<len>\r\n followed by exactly <len> raw bytes and
/// NO trailing CRLF. Used for the RDB payload of a full resync.
pub fn parse_file_dump(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    if data.is_empty() {
        return Ok(None);
    }
    if data[0] != b'$' {
        return Err(HematiteError::Protocol(format!(
            "Invalid file dump type byte: 0x{:02x}",
            data[0]
        )));
    }

    let (len_line, header_consumed) = match parse_line(data, 1)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let len = parse_len(len_line, "file dump length")?;
    if len < 0 {
        return Err(HematiteError::Protocol("Negative file dump length".into()));
    }

    let len = len as usize;
    if data.len() < header_consumed + len {
        return Ok(None); // Need more data
    }

    let payload = data[header_consumed..header_consumed + len].to_vec();
    Ok(Some((RespFrame::FileDump(payload), header_consumed + len)))
}

/// Parse a simple string: +OK\r\n
fn parse_simple_string(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1).map(|opt| {
        opt.map(|(line, consumed)| (RespFrame::SimpleString(line.to_vec()), consumed))
    })
}

/// Parse an error: -Error message\r\n
fn parse_error(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1)
        .map(|opt| opt.map(|(line, consumed)| (RespFrame::Error(line.to_vec()), consumed)))
}

/// Parse an integer: :1000\r\n
fn parse_integer(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1).and_then(|opt| {
        opt.map(|(line, consumed)| {
            let s = std::str::from_utf8(line)
                .map_err(|_| HematiteError::Protocol("Invalid UTF-8 in integer".into()))?;
            let n = s
                .parse::<i64>()
                .map_err(|_| HematiteError::Protocol("Invalid integer format".into()))?;
            Ok((RespFrame::Integer(n), consumed))
        })
        .transpose()
    })
}

/// Parse a bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
fn parse_bulk_string(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let (len_line, header_consumed) = match parse_line(data, 1)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let len = parse_len(len_line, "bulk string length")?;

    if len == -1 {
        return Ok(Some((RespFrame::BulkString(None), header_consumed)));
    }

    if len < 0 {
        return Err(HematiteError::Protocol("Invalid negative bulk string length".into()));
    }

    let len = len as usize;
    let total_needed = header_consumed + len + 2; // +2 for \r\n

    if data.len() < total_needed {
        return Ok(None); // Need more data
    }

    if data[header_consumed + len] != b'\r' || data[header_consumed + len + 1] != b'\n' {
        return Err(HematiteError::Protocol("Missing CRLF after bulk string".into()));
    }

    let content = data[header_consumed..header_consumed + len].to_vec();
    Ok(Some((RespFrame::BulkString(Some(content)), total_needed)))
}

/// Parse an array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
fn parse_array(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let (len_line, header_consumed) = match parse_line(data, 1)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let len = parse_len(len_line, "array length")?;

    if len == -1 {
        return Ok(Some((RespFrame::Array(None), header_consumed)));
    }

    if len < 0 {
        return Err(HematiteError::Protocol("Invalid negative array length".into()));
    }

    let len = len as usize;
    let mut elements = Vec::with_capacity(len);
    let mut total_consumed = header_consumed;

    for _ in 0..len {
        match parse_frame(&data[total_consumed..])? {
            Some((frame, consumed)) => {
                elements.push(frame);
                total_consumed += consumed;
            }
            None => return Ok(None), // Need more data
        }
    }

    Ok(Some((RespFrame::Array(Some(elements)), total_consumed)))
}

/// Parse a length header line into a signed count
fn parse_len(line: &[u8], what: &str) -> Result<i64> {
    let s = std::str::from_utf8(line)
        .map_err(|_| HematiteError::Protocol(format!("Invalid UTF-8 in {}", what)))?;
    s.parse::<i64>()
        .map_err(|_| HematiteError::Protocol(format!("Invalid {}", what)))
}

/// Parse a line ending with \r\n
fn parse_line(data: &[u8], skip_prefix: usize) -> Result<Option<(&[u8], usize)>> {
    if data.len() < skip_prefix + 2 {
        return Ok(None);
    }

    for i in skip_prefix..data.len() - 1 {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Ok(Some((&data[skip_prefix..i], i + 2)));
        }
    }

    Ok(None) // Need more data
}

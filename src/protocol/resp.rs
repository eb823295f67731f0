//! RESP data types and frame definitions

/// RESP protocol frame types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespFrame {
    /// Simple string: +OK\r\n
    SimpleString(Vec<u8>),

    /// Error: -Error message\r\n
    Error(Vec<u8>),

    /// Integer: :1000\r\n
    Integer(i64),

    /// Bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    BulkString(Option<Vec<u8>>),

    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n or *-1\r\n (null)
    Array(Option<Vec<RespFrame>>),

    /// Raw payload framed as $<len>\r\n<bytes> with no trailing CRLF.
    /// Only ever exchanged during replication full-resync.
    FileDump(Vec<u8>),
}

impl RespFrame {
    /// Create the +OK response
    pub fn ok() -> Self {
        RespFrame::SimpleString(b"OK".to_vec())
    }

    /// Create a simple string response
    pub fn simple_string(s: impl Into<Vec<u8>>) -> Self {
        RespFrame::SimpleString(s.into())
    }

    /// Create an error response
    pub fn error(msg: impl Into<Vec<u8>>) -> Self {
        RespFrame::Error(msg.into())
    }

    /// Create a null bulk string
    pub fn null_bulk() -> Self {
        RespFrame::BulkString(None)
    }

    /// Create a null array
    pub fn null_array() -> Self {
        RespFrame::Array(None)
    }

    /// Create a bulk string from bytes
    pub fn bulk_string(bytes: impl Into<Vec<u8>>) -> Self {
        RespFrame::BulkString(Some(bytes.into()))
    }

    /// Create an array of frames
    pub fn array(frames: Vec<RespFrame>) -> Self {
        RespFrame::Array(Some(frames))
    }

    /// Build the command array [cmd, arg, ...] out of string tokens
    pub fn command(tokens: &[&str]) -> Self {
        RespFrame::Array(Some(
            tokens.iter().map(|t| RespFrame::bulk_string(t.as_bytes())).collect(),
        ))
    }

    /// Check if this frame is an error
    pub fn is_error(&self) -> bool {
        matches!(self, RespFrame::Error(_))
    }

    /// Check if this frame represents a null value
    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::BulkString(None) | RespFrame::Array(None))
    }
}

impl From<String> for RespFrame {
    fn from(s: String) -> Self {
        RespFrame::BulkString(Some(s.into_bytes()))
    }
}

impl From<&str> for RespFrame {
    fn from(s: &str) -> Self {
        RespFrame::BulkString(Some(s.as_bytes().to_vec()))
    }
}

impl From<i64> for RespFrame {
    fn from(n: i64) -> Self {
        RespFrame::Integer(n)
    }
}

impl From<Vec<RespFrame>> for RespFrame {
    fn from(frames: Vec<RespFrame>) -> Self {
        RespFrame::Array(Some(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_frame_creation() {
        let ok = RespFrame::ok();
        assert!(matches!(ok, RespFrame::SimpleString(_)));

        let err = RespFrame::error("ERR test");
        assert!(err.is_error());

        let null = RespFrame::null_bulk();
        assert!(null.is_null());
    }

    #[test]
    fn test_resp_frame_conversions() {
        let frame: RespFrame = "hello".into();
        assert!(matches!(frame, RespFrame::BulkString(Some(_))));

        let frame: RespFrame = 42i64.into();
        assert!(matches!(frame, RespFrame::Integer(42)));
    }

    #[test]
    fn test_command_builder() {
        let frame = RespFrame::command(&["REPLCONF", "ACK", "0"]);
        match frame {
            RespFrame::Array(Some(items)) => assert_eq!(items.len(), 3),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

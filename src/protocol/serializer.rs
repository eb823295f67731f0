//! RESP protocol serializer implementation
//!
//! Every frame has exactly one canonical byte form; serialization is a pure
//! function of the frame, so repeated calls always produce identical bytes.

use super::resp::RespFrame;

/// Serialize a RESP frame into an existing buffer
pub fn serialize_to(frame: &RespFrame, out: &mut Vec<u8>) {
    match frame {
        RespFrame::SimpleString(bytes) => {
            out.push(b'+');
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }

        RespFrame::Error(bytes) => {
            out.push(b'-');
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }

        RespFrame::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        RespFrame::BulkString(opt) => match opt {
            Some(bytes) => {
                out.push(b'$');
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            None => {
                out.extend_from_slice(b"$-1\r\n");
            }
        },

        RespFrame::Array(opt) => match opt {
            Some(frames) => {
                out.push(b'*');
                out.extend_from_slice(frames.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for frame in frames {
                    serialize_to(frame, out);
                }
            }
            None => {
                out.extend_from_slice(b"*-1\r\n");
            }
        },

        // Bulk-string header plus raw payload, no trailing CRLF
        RespFrame::FileDump(bytes) => {
            out.push(b'$');
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
        }
    }
}

/// Serialize a RESP frame to a fresh byte vector
pub fn serialize(frame: &RespFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    serialize_to(frame, &mut buf);
    buf
}

/// Length in bytes of the canonical serialization of a frame
pub fn frame_len(frame: &RespFrame) -> usize {
    fn digits(n: usize) -> usize {
        n.to_string().len()
    }

    match frame {
        RespFrame::SimpleString(bytes) | RespFrame::Error(bytes) => 1 + bytes.len() + 2,
        RespFrame::Integer(n) => 1 + n.to_string().len() + 2,
        RespFrame::BulkString(Some(bytes)) => 1 + digits(bytes.len()) + 2 + bytes.len() + 2,
        RespFrame::BulkString(None) => 5,
        RespFrame::Array(Some(frames)) => {
            1 + digits(frames.len()) + 2 + frames.iter().map(frame_len).sum::<usize>()
        }
        RespFrame::Array(None) => 5,
        RespFrame::FileDump(bytes) => 1 + digits(bytes.len()) + 2 + bytes.len(),
    }
}

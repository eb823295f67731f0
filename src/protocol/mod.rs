//! RESP protocol implementation
//!
//! Implements the wire format spoken to clients and between master and
//! replica: frame types, an incremental parser tolerant of arbitrary TCP
//! fragmentation, and a canonical serializer.

pub mod parser;
pub mod resp;
pub mod serializer;

pub use parser::{parse_file_dump, parse_frame, RespParser};
pub use resp::RespFrame;
pub use serializer::{frame_len, serialize, serialize_to};

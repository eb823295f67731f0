//! Connection management for individual clients
//!
//! Each connection owns its socket, an incremental parser for inbound
//! bytes, a write buffer for outbound bytes, its dispatch mode, and the
//! byte counter replication offsets are derived from.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;

use crate::commands::ConnState;
use crate::error::{HematiteError, Result};
use crate::protocol::{serialize, RespFrame, RespParser};
use crate::storage::StreamId;

/// A blocking operation the connection is parked on
#[derive(Debug, Clone)]
pub enum Pending {
    /// BLPOP waiting for an element on one list
    Blpop {
        key: Vec<u8>,
        deadline: Option<Instant>,
    },

    /// XREAD BLOCK waiting for entries newer than `after` on each stream
    Xread {
        keys: Vec<Vec<u8>>,
        after: Vec<StreamId>,
        deadline: Option<Instant>,
    },

    /// WAIT barrier: per-replica (conn_id, target sent-offset) pairs
    Wait {
        numreplicas: usize,
        targets: Vec<(u64, u64)>,
        deadline: Option<Instant>,
    },
}

/// Represents one client connection
pub struct Connection {
    /// Unique connection id
    pub id: u64,

    /// TCP stream
    stream: TcpStream,

    /// Client address
    pub addr: SocketAddr,

    /// RESP protocol parser
    parser: RespParser,

    /// Write buffer for bytes the socket would not yet take
    write_buffer: Vec<u8>,

    /// Dispatch mode and transaction queue
    pub state: ConnState,

    /// Blocking operation this connection is parked on, if any
    pub pending: Option<Pending>,

    /// Sum of serialized lengths of every frame received
    pub received_bytes: u64,

    /// Set when either direction failed; the reaper closes the socket
    closing: bool,
}

impl Connection {
    /// Wrap an accepted stream
    pub fn new(id: u64, stream: TcpStream, addr: SocketAddr) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Connection {
            id,
            stream,
            addr,
            parser: RespParser::new(),
            write_buffer: Vec::with_capacity(4096),
            state: ConnState::new(),
            pending: None,
            received_bytes: 0,
            closing: false,
        })
    }

    /// Read available data into the parser.
    /// Returns true if any bytes arrived, false when the read would block.
    pub fn read(&mut self) -> Result<bool> {
        let mut buf = [0u8; 4096];
        let mut any = false;

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.closing = true;
                    return Err(HematiteError::Connection("Connection closed by peer".into()));
                }
                Ok(n) => {
                    self.parser.feed(&buf[..n]);
                    any = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(any),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closing = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Try to parse the next frame out of the buffered bytes
    pub fn parse_frame(&mut self) -> Result<Option<RespFrame>> {
        self.parser.parse()
    }

    /// Queue a frame for sending
    pub fn send_frame(&mut self, frame: &RespFrame) {
        let bytes = serialize(frame);
        self.send_raw(&bytes);
    }

    /// Queue raw bytes for sending
    pub fn send_raw(&mut self, data: &[u8]) {
        self.write_buffer.extend_from_slice(data);
    }

    /// Write as much of the buffer as the socket accepts
    pub fn flush(&mut self) -> Result<()> {
        let mut written = 0;
        while written < self.write_buffer.len() {
            match self.stream.write(&self.write_buffer[written..]) {
                Ok(0) => {
                    self.closing = true;
                    return Err(HematiteError::Connection("Socket closed while writing".into()));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closing = true;
                    return Err(e.into());
                }
            }
        }
        self.write_buffer.drain(..written);
        Ok(())
    }

    /// Whether buffered output remains
    pub fn has_pending_writes(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    /// Mark the connection for closure
    pub fn set_closing(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Shut down the socket
    pub fn close(&mut self) {
        self.closing = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connection_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        let mut conn = Connection::new(1, server_side, peer).unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").unwrap();
        client.flush().unwrap();

        // Poll until the bytes arrive
        let mut frame = None;
        for _ in 0..100 {
            let _ = conn.read();
            if let Some(parsed) = conn.parse_frame().unwrap() {
                frame = Some(parsed);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(frame, Some(RespFrame::command(&["PING"])));

        conn.send_frame(&RespFrame::simple_string("PONG"));
        assert!(conn.has_pending_writes());
        conn.flush().unwrap();

        let mut reply = [0u8; 7];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"+PONG\r\n");
    }

    #[test]
    fn test_read_detects_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        let mut conn = Connection::new(1, server_side, peer).unwrap();

        drop(client);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let result = conn.read();
        assert!(result.is_err());
        assert!(conn.is_closing());
    }
}

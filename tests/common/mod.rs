//! Shared helpers for integration tests: an in-process server on an
//! ephemeral port and a small RESP test client.
#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hematite::config::Config;
use hematite::network::Server;
use hematite::protocol::{serialize, RespFrame, RespParser};

pub struct TestServer {
    pub port: u16,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a master on an ephemeral port
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    /// Start a server with a tweaked configuration
    pub fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config {
            bind: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        };
        tweak(&mut config);

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut server = Server::from_config(config, Arc::clone(&shutdown)).expect("server start");
        let port = server.port();
        let handle = std::thread::spawn(move || {
            let _ = server.run();
        });

        TestServer {
            port,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Start a replica of the given master port
    pub fn start_replica_of(master_port: u16) -> Self {
        Self::start_with(|config| {
            config.replicaof = Some(("127.0.0.1".to_string(), master_port));
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct Client {
    stream: TcpStream,
    parser: RespParser,
}

impl Client {
    /// Connect to a test server, retrying briefly while it boots
    pub fn connect(port: u16) -> Self {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => {
                    stream.set_nodelay(true).unwrap();
                    stream
                        .set_read_timeout(Some(Duration::from_millis(50)))
                        .unwrap();
                    return Client {
                        stream,
                        parser: RespParser::new(),
                    };
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10))
                }
                Err(err) => panic!("could not connect to test server: {}", err),
            }
        }
    }

    /// Send one command as a RESP array
    pub fn send(&mut self, tokens: &[&str]) {
        let bytes = serialize(&RespFrame::command(tokens));
        self.stream.write_all(&bytes).unwrap();
        self.stream.flush().unwrap();
    }

    /// Send raw bytes
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    /// Read one frame, failing after the timeout
    pub fn read_frame(&mut self, timeout: Duration) -> RespFrame {
        self.try_read_frame(timeout)
            .expect("timed out waiting for a reply")
    }

    /// Read one frame if it arrives within the timeout
    pub fn try_read_frame(&mut self, timeout: Duration) -> Option<RespFrame> {
        self.read_with(timeout, |parser| parser.parse())
    }

    /// Read one replication file dump if it arrives within the timeout
    pub fn try_read_file_dump(&mut self, timeout: Duration) -> Option<RespFrame> {
        self.read_with(timeout, |parser| parser.parse_file_dump())
    }

    fn read_with(
        &mut self,
        timeout: Duration,
        mut parse: impl FnMut(&mut RespParser) -> hematite::error::Result<Option<RespFrame>>,
    ) -> Option<RespFrame> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = parse(&mut self.parser).expect("protocol error") {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            match self.stream.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => self.parser.feed(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                Err(e) => panic!("read error: {}", e),
            }
        }
    }

    /// Round-trip helper with a generous default timeout
    pub fn query(&mut self, tokens: &[&str]) -> RespFrame {
        self.send(tokens);
        self.read_frame(Duration::from_secs(5))
    }
}

/// Shorthand frame constructors for assertions
pub fn simple(s: &str) -> RespFrame {
    RespFrame::simple_string(s)
}

pub fn bulk(s: &str) -> RespFrame {
    RespFrame::bulk_string(s.as_bytes())
}

pub fn int(n: i64) -> RespFrame {
    RespFrame::Integer(n)
}

pub fn array(frames: Vec<RespFrame>) -> RespFrame {
    RespFrame::array(frames)
}

/// Extract the UTF-8 text of a bulk string frame
pub fn bulk_text(frame: &RespFrame) -> String {
    match frame {
        RespFrame::BulkString(Some(data)) => String::from_utf8_lossy(data).into_owned(),
        other => panic!("expected bulk string, got {:?}", other),
    }
}

/// Poll an assertion until it holds or the timeout passes
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

//! TCP listener wrapper

use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::error::{HematiteError, Result};

/// Non-blocking TCP listener
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to an address and switch to non-blocking accepts
    pub fn bind(addr: &str) -> Result<Self> {
        let inner = TcpListener::bind(addr)
            .map_err(|e| HematiteError::Io(format!("Failed to bind {}: {}", addr, e)))?;
        inner.set_nonblocking(true)?;
        log::info!("Listening on {}", addr);
        Ok(Listener { inner })
    }

    /// Accept one pending connection, if any
    pub fn accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match self.inner.accept() {
            Ok((stream, addr)) => Ok(Some((stream, addr))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The locally bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

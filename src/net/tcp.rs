//! tokio TCP transport.
//!
//! Streams are only ever touched through `try_read`/`try_write`, so a
//! responder never waits on the network. The runtime's driver keeps the
//! readiness flags current between scheduling passes.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};

use anyhow::Context as _;
use tokio::net::TcpStream;

use crate::net::{DataPorts, Socket};

pub struct TcpSocket {
    stream: TcpStream,
    connected: bool,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
}

impl TcpSocket {
    pub fn new(stream: TcpStream) -> Self {
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        Self {
            stream,
            connected: true,
            local,
            remote,
        }
    }
}

impl Socket for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.try_read(buf) {
            Ok(0) => {
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(e),
            Err(e) => {
                self.connected = false;
                Err(e)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.stream.try_write(data) {
            Err(e) if e.kind() != io::ErrorKind::WouldBlock => {
                self.connected = false;
                Err(e)
            }
            other => other,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn close(self: Box<Self>) {
        // Half-close so queued bytes still reach the peer before FIN.
        if let Ok(std_stream) = self.stream.into_std() {
            let _ = std_stream.shutdown(Shutdown::Write);
        }
    }
}

/// Passive data ports on real TCP listeners.
pub struct TcpDataPorts {
    bind_ip: IpAddr,
    base: u16,
    span: u16,
    listeners: HashMap<u16, std::net::TcpListener>,
}

impl TcpDataPorts {
    pub fn new(bind_ip: IpAddr, base: u16, span: u16) -> Self {
        Self {
            bind_ip,
            base,
            span: span.max(1),
            listeners: HashMap::new(),
        }
    }
}

impl DataPorts for TcpDataPorts {
    fn open(&mut self) -> anyhow::Result<u16> {
        for offset in 0..self.span {
            let Some(port) = self.base.checked_add(offset) else {
                break;
            };
            if self.listeners.contains_key(&port) {
                continue;
            }
            let Ok(listener) = std::net::TcpListener::bind((self.bind_ip, port)) else {
                continue;
            };
            listener
                .set_nonblocking(true)
                .context("Failed to make data port non-blocking")?;
            tracing::debug!(port, "Data port opened");
            self.listeners.insert(port, listener);
            return Ok(port);
        }
        anyhow::bail!("No free data port in {}..{}", self.base, self.base.saturating_add(self.span))
    }

    fn poll_accept(&mut self, port: u16) -> io::Result<Option<Box<dyn Socket>>> {
        let listener = self
            .listeners
            .get(&port)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "data port not open"))?;

        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                let stream = TcpStream::from_std(stream)?;
                tracing::debug!(port, %peer, "Data connection accepted");
                Ok(Some(Box::new(TcpSocket::new(stream))))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self, port: u16) {
        if self.listeners.remove(&port).is_some() {
            tracing::debug!(port, "Data port closed");
        }
    }
}

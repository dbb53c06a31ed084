//! Transport-side interfaces.
//!
//! Responders only see sockets through [`Socket`] and passive data ports
//! through [`DataPorts`]. Two implementations ship with the crate:
//!
//! - **`tcp`**: tokio TCP streams driven with non-blocking `try_read`/`try_write`
//! - **`loopback`**: in-process sockets and data ports with a scriptable peer

use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;

pub mod context;
pub mod loopback;
pub mod tcp;

pub use context::{CommandHandler, Context, LoggingCommands};

/// A non-blocking byte stream bound to one connection.
///
/// `read` returns `WouldBlock` when nothing is available yet and `Ok(0)`
/// once the peer has closed its side. `write` may accept fewer bytes than
/// offered, or return `WouldBlock` when the transmit window is full.
pub trait Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
    fn is_connected(&self) -> bool;
    fn remote_addr(&self) -> Option<SocketAddr>;
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Hands the connection back to the transport, closing it.
    fn close(self: Box<Self>);
}

impl std::fmt::Debug for dyn Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("remote_addr", &self.remote_addr())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Passive listening ports for secondary data connections.
pub trait DataPorts {
    /// Opens a port and returns its number.
    fn open(&mut self) -> anyhow::Result<u16>;

    /// Returns the data connection once one has arrived on `port`.
    fn poll_accept(&mut self, port: u16) -> io::Result<Option<Box<dyn Socket>>>;

    fn close(&mut self, port: u16);
}

/// Outcome of one non-blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Data(usize),
    Idle,
    Closed,
}

/// Reads once from `socket`, appending at most `max` bytes to `dst`.
pub fn receive(socket: &mut dyn Socket, dst: &mut BytesMut, max: usize) -> Received {
    let mut temp = [0u8; 1024];
    let limit = max.min(temp.len());
    if limit == 0 {
        return Received::Idle;
    }

    match socket.read(&mut temp[..limit]) {
        Ok(0) => Received::Closed,
        Ok(n) => {
            dst.extend_from_slice(&temp[..n]);
            Received::Data(n)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Received::Idle,
        Err(e) => {
            tracing::debug!(error = %e, "Socket read failed");
            Received::Closed
        }
    }
}

/// Removes one line (terminated by `\n`, optional `\r`) from the front of
/// `buf`. Invalid UTF-8 is replaced rather than rejected.
pub fn take_line(buf: &mut BytesMut) -> Option<String> {
    let end = buf.iter().position(|&b| b == b'\n')?;
    let line = buf.split_to(end + 1);
    let mut text = &line[..end];
    if let Some(stripped) = text.strip_suffix(b"\r") {
        text = stripped;
    }
    Some(String::from_utf8_lossy(text).into_owned())
}

/// Drops everything up to and including the next newline, or the whole
/// buffer if there is none. Used to recover from over-long lines.
pub fn discard_line(buf: &mut BytesMut) {
    match buf.iter().position(|&b| b == b'\n') {
        Some(end) => buf.advance(end + 1),
        None => buf.clear(),
    }
}

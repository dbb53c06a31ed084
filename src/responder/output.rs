//! Pending output: a byte buffer, an ordered queue of buffers, and a
//! staging buffer for streaming files.
//!
//! All writers here push as much as the socket takes right now and report
//! what is left. A `WouldBlock` from the socket is not an error, it just
//! means nothing more fits this time round.

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;

use crate::net::Socket;
use crate::storage::FileStore;

/// Chunks streamed from a file per call before yielding.
const MAX_CHUNKS_PER_PUMP: usize = 8;

/// Writes the front of `buf` to `socket` until either is exhausted.
/// Returns the number of bytes written.
fn write_some<B: Buf>(socket: &mut dyn Socket, buf: &mut B) -> io::Result<usize> {
    let mut written = 0;
    while buf.has_remaining() {
        match socket.write(buf.chunk()) {
            Ok(0) => break,
            Ok(n) => {
                buf.advance(n);
                written += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// Append-only response buffer.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    buf: BytesMut,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn push_str(&mut self, s: &str) {
        self.push(s.as_bytes());
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes as much as possible. Returns the bytes still pending.
    pub fn write_to(&mut self, socket: &mut dyn Socket) -> io::Result<usize> {
        write_some(socket, &mut self.buf)?;
        Ok(self.buf.len())
    }
}

/// Buffers waiting to go out, drained front to back.
#[derive(Debug, Default)]
pub struct OutputStack {
    queue: VecDeque<Bytes>,
}

impl OutputStack {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if !data.is_empty() {
            self.queue.push_back(data);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total pending bytes.
    pub fn len(&self) -> usize {
        self.queue.iter().map(Bytes::len).sum()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Writes queued buffers in order. Returns the bytes still pending.
    pub fn write_to(&mut self, socket: &mut dyn Socket) -> io::Result<usize> {
        while let Some(front) = self.queue.front_mut() {
            write_some(socket, front)?;
            if front.has_remaining() {
                break;
            }
            self.queue.pop_front();
        }
        Ok(self.len())
    }
}

/// Fixed-size staging buffer for file-backed sends.
#[derive(Debug)]
pub struct NetworkBuffer {
    data: BytesMut,
    chunk: usize,
}

impl NetworkBuffer {
    pub fn new(chunk: usize) -> Self {
        let chunk = chunk.max(1);
        Self {
            data: BytesMut::with_capacity(chunk),
            chunk,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn refill(&mut self, file: &mut dyn FileStore) -> anyhow::Result<usize> {
        self.data.resize(self.chunk, 0);
        match file.read(&mut self.data[..]) {
            Ok(n) => {
                self.data.truncate(n);
                Ok(n)
            }
            Err(e) => {
                self.data.clear();
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpProgress {
    /// The whole file has been written.
    pub done: bool,
    pub written: usize,
}

/// Streams `file` to `socket` through `staging`, stopping when the socket
/// is full or after a bounded number of chunks.
pub fn pump_file(
    file: &mut dyn FileStore,
    staging: &mut NetworkBuffer,
    socket: &mut dyn Socket,
) -> anyhow::Result<PumpProgress> {
    let mut written = 0;
    for _ in 0..MAX_CHUNKS_PER_PUMP {
        if staging.is_empty() && staging.refill(file)? == 0 {
            return Ok(PumpProgress { done: true, written });
        }
        written += write_some(socket, &mut staging.data)?;
        if !staging.is_empty() {
            break;
        }
    }
    Ok(PumpProgress { done: false, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::loopback::LoopbackSocket;

    #[test]
    fn buffer_reports_remainder_when_socket_is_full() {
        let (mut socket, peer) = LoopbackSocket::pair();
        peer.set_capacity(Some(4));

        let mut out = OutputBuffer::new();
        out.push_str("hello world");
        assert_eq!(out.write_to(&mut socket).unwrap(), 7);
        assert_eq!(peer.take_output(), b"hell");

        assert_eq!(out.write_to(&mut socket).unwrap(), 3);
        assert_eq!(peer.take_output(), b"o wo");
    }

    #[test]
    fn stack_drains_in_order() {
        let (mut socket, peer) = LoopbackSocket::pair();
        let mut stack = OutputStack::new();
        stack.push(Bytes::from_static(b"first,"));
        stack.push(Bytes::from_static(b""));
        stack.push(Bytes::from_static(b"second"));
        assert_eq!(stack.len(), 12);

        assert_eq!(stack.write_to(&mut socket).unwrap(), 0);
        assert!(stack.is_empty());
        assert_eq!(peer.output_string(), "first,second");
    }
}

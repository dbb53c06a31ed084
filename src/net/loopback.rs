//! In-process sockets.
//!
//! A [`LoopbackSocket`] is handed to a responder while the matching
//! [`LoopbackPeer`] plays the remote end: it feeds input, collects output,
//! limits how much the socket accepts, and closes or resets the link.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use crate::net::{DataPorts, Socket};

#[derive(Debug, Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    /// Maximum bytes the peer leaves unread before writes stall.
    capacity: Option<usize>,
    peer_closed: bool,
    reset: bool,
    closed_by_socket: bool,
}

pub struct LoopbackSocket {
    pipe: Rc<RefCell<Pipe>>,
    local: SocketAddr,
    remote: SocketAddr,
}

#[derive(Clone)]
pub struct LoopbackPeer {
    pipe: Rc<RefCell<Pipe>>,
}

impl LoopbackSocket {
    pub fn pair() -> (LoopbackSocket, LoopbackPeer) {
        Self::pair_with_addrs(
            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 10), 80)),
            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 20), 40000)),
        )
    }

    pub fn pair_with_addrs(local: SocketAddr, remote: SocketAddr) -> (LoopbackSocket, LoopbackPeer) {
        let pipe = Rc::new(RefCell::new(Pipe::default()));
        let socket = LoopbackSocket {
            pipe: Rc::clone(&pipe),
            local,
            remote,
        };
        (socket, LoopbackPeer { pipe })
    }

    /// Boxed socket plus its peer, the form responders accept.
    pub fn boxed() -> (Box<dyn Socket>, LoopbackPeer) {
        let (socket, peer) = Self::pair();
        (Box::new(socket), peer)
    }
}

impl Socket for LoopbackSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.borrow_mut();
        if pipe.reset {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        if pipe.inbound.is_empty() {
            return if pipe.peer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(pipe.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.borrow_mut();
        if pipe.reset {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        let room = match pipe.capacity {
            Some(cap) => cap.saturating_sub(pipe.outbound.len()),
            None => data.len(),
        };
        if room == 0 && !data.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = data.len().min(room);
        pipe.outbound.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        !self.pipe.borrow().reset
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    fn close(self: Box<Self>) {
        self.pipe.borrow_mut().closed_by_socket = true;
    }
}

impl LoopbackPeer {
    pub fn send(&self, data: &[u8]) {
        self.pipe.borrow_mut().inbound.extend(data.iter().copied());
    }

    pub fn send_str(&self, s: &str) {
        self.send(s.as_bytes());
    }

    /// Takes everything the socket has written so far.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.pipe.borrow_mut().outbound)
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }

    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.pipe.borrow_mut().capacity = capacity;
    }

    /// Orderly close from the remote side: reads drain, then return 0.
    pub fn close(&self) {
        self.pipe.borrow_mut().peer_closed = true;
    }

    /// Abrupt loss of the connection.
    pub fn reset(&self) {
        self.pipe.borrow_mut().reset = true;
    }

    /// Whether the responder has given the socket back.
    pub fn is_closed_by_socket(&self) -> bool {
        self.pipe.borrow().closed_by_socket
    }

    /// Whether the socket still exists somewhere other than this peer.
    pub fn socket_alive(&self) -> bool {
        Rc::strong_count(&self.pipe) > 1
    }
}

#[derive(Default)]
struct PortTable {
    next_port: u16,
    open: HashMap<u16, VecDeque<LoopbackSocket>>,
    refuse: bool,
}

/// Data ports backed by loopback sockets. Clones share the same table.
#[derive(Clone, Default)]
pub struct LoopbackPorts {
    table: Rc<RefCell<PortTable>>,
}

impl LoopbackPorts {
    pub fn new() -> Self {
        let ports = Self::default();
        ports.table.borrow_mut().next_port = 50000;
        ports
    }

    /// Connects to an open port as the remote side would.
    pub fn connect(&self, port: u16) -> Option<LoopbackPeer> {
        let mut table = self.table.borrow_mut();
        let pending = table.open.get_mut(&port)?;
        let (socket, peer) = LoopbackSocket::pair_with_addrs(
            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 10), port)),
            SocketAddr::from((Ipv4Addr::new(192, 168, 1, 20), 40001)),
        );
        pending.push_back(socket);
        Some(peer)
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.table.borrow().open.contains_key(&port)
    }

    pub fn open_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.table.borrow().open.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Makes further `open` calls fail.
    pub fn refuse(&self, refuse: bool) {
        self.table.borrow_mut().refuse = refuse;
    }
}

impl DataPorts for LoopbackPorts {
    fn open(&mut self) -> anyhow::Result<u16> {
        let mut table = self.table.borrow_mut();
        if table.refuse {
            anyhow::bail!("no data port available");
        }
        let port = table.next_port;
        table.next_port = table.next_port.wrapping_add(1);
        table.open.insert(port, VecDeque::new());
        Ok(port)
    }

    fn poll_accept(&mut self, port: u16) -> io::Result<Option<Box<dyn Socket>>> {
        let mut table = self.table.borrow_mut();
        let pending = table
            .open
            .get_mut(&port)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "data port not open"))?;
        Ok(pending.pop_front().map(|s| Box::new(s) as Box<dyn Socket>))
    }

    fn close(&mut self, port: u16) {
        self.table.borrow_mut().open.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_blocks_until_data_then_reports_close() {
        let (mut socket, peer) = LoopbackSocket::pair();
        let mut buf = [0u8; 8];
        let err = socket.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        peer.send(b"abc");
        peer.close();
        assert_eq!(socket.read(&mut buf).unwrap(), 3);
        assert_eq!(socket.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reset_fails_writes() {
        let (mut socket, peer) = LoopbackSocket::pair();
        peer.reset();
        assert!(!socket.is_connected());
        assert!(socket.write(b"x").is_err());
    }

    #[test]
    fn ports_hand_out_connections() {
        let mut ports = LoopbackPorts::new();
        let port = ports.open().unwrap();
        assert!(ports.poll_accept(port).unwrap().is_none());
        let _peer = ports.connect(port).unwrap();
        assert!(ports.poll_accept(port).unwrap().is_some());
        ports.close(port);
        assert!(!ports.is_open(port));
    }
}

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use switchboard::net::tcp::{TcpDataPorts, TcpSocket};
use switchboard::net::{DataPorts, Socket};

/// Retries a non-blocking read until bytes arrive.
async fn read_some(socket: &mut TcpSocket, buf: &mut [u8]) -> usize {
    for _ in 0..200 {
        match socket.read(buf) {
            Ok(n) => return n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
    panic!("no data arrived");
}

/// Retries a non-blocking write until the socket takes everything.
async fn write_all(socket: &mut dyn Socket, mut data: &[u8]) {
    for _ in 0..200 {
        match socket.write(data) {
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => panic!("write failed: {e}"),
        }
        if data.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("socket never became writable");
}

#[tokio::test]
async fn test_tcp_socket_reads_and_writes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = TcpSocket::new(stream);

    assert!(socket.is_connected());
    assert_eq!(socket.local_addr(), Some(addr));

    let mut buf = [0u8; 64];
    assert_eq!(
        socket.read(&mut buf).unwrap_err().kind(),
        io::ErrorKind::WouldBlock
    );

    client.write_all(b"NOOP\r\n").await.unwrap();
    let n = read_some(&mut socket, &mut buf).await;
    assert_eq!(&buf[..n], b"NOOP\r\n");

    write_all(&mut socket, b"200 OK\r\n").await;
    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"200 OK\r\n");

    drop(client);
    let n = read_some(&mut socket, &mut buf).await;
    assert_eq!(n, 0);
    assert!(!socket.is_connected());
}

#[tokio::test]
async fn test_tcp_socket_close_sends_pending_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket: Box<dyn Socket> = Box::new(TcpSocket::new(stream));

    write_all(socket.as_mut(), b"221 Goodbye\r\n").await;
    socket.close();

    let mut received = Vec::new();
    client.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"221 Goodbye\r\n");
}

#[tokio::test]
async fn test_data_ports_accept_connection() {
    let mut ports = TcpDataPorts::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 47100, 32);
    let port = ports.open().unwrap();
    assert!(ports.poll_accept(port).unwrap().is_none());

    let _client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();

    let mut accepted = None;
    for _ in 0..200 {
        if let Some(socket) = ports.poll_accept(port).unwrap() {
            accepted = Some(socket);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let socket = accepted.expect("data connection never arrived");
    assert!(socket.is_connected());

    ports.close(port);
    assert_eq!(
        ports.poll_accept(port).unwrap_err().kind(),
        io::ErrorKind::NotFound
    );
}

#[test]
fn test_data_ports_skip_ports_in_use() {
    let mut ports = TcpDataPorts::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 47200, 32);
    let first = ports.open().unwrap();
    let second = ports.open().unwrap();

    assert_ne!(first, second);
    ports.close(first);
    ports.close(second);
}

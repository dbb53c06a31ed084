use switchboard::config::{Config, HttpConfig, TelnetConfig};
use switchboard::http::HttpResponder;
use switchboard::net::LoggingCommands;
use switchboard::net::loopback::{LoopbackPorts, LoopbackSocket};
use switchboard::responder::{
    NetworkResponder, Protocol, Responder, ResponderId, ResponderRegistry, ResponderSnapshot,
    ResponderState, YamlSink,
};
use switchboard::server::Stack;
use switchboard::storage::MemoryFileSystem;
use switchboard::telnet::TelnetResponder;

fn stack(http: usize, ftp: usize, telnet: usize) -> Stack {
    let mut cfg = Config::default();
    cfg.responders.http = http;
    cfg.responders.ftp = ftp;
    cfg.responders.telnet = telnet;
    Stack::from_config(
        &cfg,
        Box::new(MemoryFileSystem::new()),
        Box::new(LoopbackPorts::new()),
        Box::new(LoggingCommands),
    )
    .unwrap()
}

#[test]
fn test_registry_refuses_past_capacity() {
    let mut registry = ResponderRegistry::new(1);
    let id = registry
        .push_with(|id| Responder::Http(HttpResponder::new(id, HttpConfig::default(), 512)))
        .unwrap();
    assert_eq!(id, ResponderId(0));

    let err = registry
        .push_with(|id| Responder::Telnet(TelnetResponder::new(id, TelnetConfig::default(), 512)))
        .unwrap_err();
    assert!(err.to_string().contains("full"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_registry_walks_slots_in_order() {
    let stack = stack(2, 1, 1);
    let registry = stack.registry();

    assert_eq!(registry.first(), Some(ResponderId(0)));
    assert_eq!(registry.next(ResponderId(0)), Some(ResponderId(1)));
    assert_eq!(registry.next(ResponderId(3)), None);

    let protocols: Vec<Protocol> = registry.iter().map(|r| r.protocol()).collect();
    assert_eq!(
        protocols,
        vec![Protocol::Http, Protocol::Http, Protocol::Ftp, Protocol::Telnet]
    );
    assert_eq!(registry.free_count(), 4);
}

#[test]
fn test_empty_registry() {
    let stack = stack(0, 0, 0);

    assert!(stack.registry().is_empty());
    assert_eq!(stack.registry().first(), None);
}

#[test]
fn test_accept_takes_first_free_matching_slot() {
    let mut stack = stack(2, 1, 1);

    let (socket, _a) = LoopbackSocket::boxed();
    assert_eq!(stack.accept(socket, Protocol::Http, 0).ok(), Some(ResponderId(0)));
    let (socket, _b) = LoopbackSocket::boxed();
    assert_eq!(stack.accept(socket, Protocol::Http, 0).ok(), Some(ResponderId(1)));
    let (socket, _c) = LoopbackSocket::boxed();
    assert_eq!(stack.accept(socket, Protocol::Telnet, 0).ok(), Some(ResponderId(3)));

    assert_eq!(stack.registry().free_count(), 1);

    let (socket, _d) = LoopbackSocket::boxed();
    assert!(stack.accept(socket, Protocol::Http, 0).is_err());
}

#[test]
fn test_poll_reports_progress() {
    let mut stack = stack(1, 0, 0);
    assert!(!stack.poll(1));

    let (socket, peer) = LoopbackSocket::boxed();
    stack.accept(socket, Protocol::Http, 1).ok().unwrap();
    peer.send_str("GET /missing HTTP/1.1\r\n\r\n");

    let mut progressed = false;
    for now in 2..6 {
        progressed |= stack.poll(now);
    }
    assert!(progressed);
    assert!(peer.output_string().starts_with("HTTP/1.1 404"));
}

#[test]
fn test_connection_lost_by_id() {
    let mut stack = stack(1, 0, 1);
    let (socket, peer) = LoopbackSocket::boxed();
    let id = stack.accept(socket, Protocol::Telnet, 0).ok().unwrap();

    assert!(stack.connection_lost(id, 1));
    assert_eq!(stack.registry().get(id).unwrap().state(), ResponderState::Free);
    assert!(peer.is_closed_by_socket());

    assert!(!stack.connection_lost(ResponderId(9), 1));
}

#[test]
fn test_diagnostics_cover_every_responder() {
    let mut stack = stack(2, 1, 0);
    let (socket, _peer) = LoopbackSocket::boxed();
    stack.accept(socket, Protocol::Ftp, 0).ok().unwrap();

    let mut reports: Vec<ResponderSnapshot> = Vec::new();
    stack.diagnostics(&mut reports);

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].state, ResponderState::Free);
    assert_eq!(reports[2].protocol, Protocol::Ftp);
    assert_eq!(reports[2].state, ResponderState::Reading);
    assert_eq!(reports[2].remote.as_deref(), Some("192.168.1.20:40000"));
    assert_eq!(reports[2].connections, 1);
}

#[test]
fn test_yaml_diagnostics() {
    let stack = stack(1, 0, 1);
    let mut sink = YamlSink::new();
    stack.diagnostics(&mut sink);

    let yaml = sink.render().unwrap();
    assert!(yaml.contains("protocol: Http"));
    assert!(yaml.contains("protocol: Telnet"));
    assert!(yaml.contains("state: Free"));
}

#[test]
fn test_lock_is_free_between_requests() {
    let mut stack = stack(1, 0, 0);
    let (socket, peer) = LoopbackSocket::boxed();
    stack.accept(socket, Protocol::Http, 0).ok().unwrap();
    peer.send_str("GET /missing HTTP/1.1\r\n\r\n");

    for now in 1..5 {
        stack.poll(now);
    }

    assert_eq!(stack.lock().owner(), None);
}

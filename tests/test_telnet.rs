use std::cell::RefCell;
use std::rc::Rc;

use switchboard::config::Config;
use switchboard::net::CommandHandler;
use switchboard::net::loopback::{LoopbackPeer, LoopbackPorts, LoopbackSocket};
use switchboard::responder::{NetworkResponder, Protocol, ResponderId, ResponderState};
use switchboard::server::Stack;
use switchboard::storage::MemoryFileSystem;

/// Records every line and echoes it back.
#[derive(Clone, Default)]
struct Recorder {
    lines: Rc<RefCell<Vec<(ResponderId, String)>>>,
}

impl CommandHandler for Recorder {
    fn handle_line(&mut self, from: ResponderId, line: &str) -> Option<String> {
        self.lines.borrow_mut().push((from, line.to_string()));
        if line == "silent" {
            None
        } else {
            Some(format!("got {line}"))
        }
    }
}

struct Rig {
    stack: Stack,
    commands: Recorder,
    now: u64,
}

fn rig(password: &str) -> Rig {
    let mut cfg = Config::default();
    cfg.responders.http = 0;
    cfg.responders.ftp = 0;
    cfg.responders.telnet = 1;
    cfg.telnet.password = password.to_string();

    let commands = Recorder::default();
    let stack = Stack::from_config(
        &cfg,
        Box::new(MemoryFileSystem::new()),
        Box::new(LoopbackPorts::new()),
        Box::new(commands.clone()),
    )
    .unwrap();
    Rig {
        stack,
        commands,
        now: 0,
    }
}

impl Rig {
    fn connect(&mut self) -> LoopbackPeer {
        let (socket, peer) = LoopbackSocket::boxed();
        if self.stack.accept(socket, Protocol::Telnet, self.now).is_err() {
            panic!("no free responder");
        }
        peer
    }

    fn run(&mut self, passes: usize) {
        for _ in 0..passes {
            self.now += 1;
            self.stack.poll(self.now);
        }
    }

    fn state(&self) -> ResponderState {
        self.stack.registry().get(ResponderId(0)).unwrap().state()
    }

    fn lines(&self) -> Vec<String> {
        self.commands
            .lines
            .borrow()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }
}

#[test]
fn test_banner_and_prompt_without_password() {
    let mut rig = rig("");
    let peer = rig.connect();
    assert_eq!(rig.state(), ResponderState::JustConnected);

    rig.run(1);

    assert_eq!(peer.output_string(), "switchboard telnet session\r\n> ");
    assert_eq!(rig.state(), ResponderState::Reading);
}

#[test]
fn test_command_reply_and_prompt() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    peer.send_str("M115\r\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "got M115\r\n> ");
    assert_eq!(rig.lines(), vec!["M115"]);
    assert_eq!(rig.commands.lines.borrow()[0].0, ResponderId(0));
}

#[test]
fn test_command_without_reply_gets_prompt_only() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    peer.send_str("silent\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "> ");
}

#[test]
fn test_blank_line_is_not_forwarded() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    peer.send_str("   \r\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "> ");
    assert!(rig.lines().is_empty());
}

#[test]
fn test_negotiation_bytes_are_stripped() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    // IAC WILL ECHO, IAC DO SUPPRESS-GO-AHEAD, then the command.
    peer.send(&[255, 251, 1, 255, 253, 3]);
    peer.send_str("G28\r\n");
    rig.run(2);

    assert_eq!(rig.lines(), vec!["G28"]);
    assert_eq!(peer.output_string(), "got G28\r\n> ");
}

#[test]
fn test_line_split_across_reads() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);

    peer.send_str("G1 X");
    rig.run(2);
    assert!(rig.lines().is_empty());

    peer.send_str("10\r\n");
    rig.run(2);
    assert_eq!(rig.lines(), vec!["G1 X10"]);
}

#[test]
fn test_several_lines_in_one_read() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);

    peer.send_str("one\r\ntwo\r\nthree\r\n");
    rig.run(5);

    assert_eq!(rig.lines(), vec!["one", "two", "three"]);
}

#[test]
fn test_password_login() {
    let mut rig = rig("hunter2");
    let peer = rig.connect();
    rig.run(1);

    assert_eq!(peer.output_string(), "switchboard telnet session\r\nPassword: ");
    assert_eq!(rig.state(), ResponderState::Authenticating);

    peer.send_str("hunter2\r\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "Logged in.\r\n> ");
    assert_eq!(rig.state(), ResponderState::Reading);
    assert!(rig.lines().is_empty());
}

#[test]
fn test_wrong_password_disconnects() {
    let mut rig = rig("hunter2");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    peer.send_str("guess\r\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "Invalid password.\r\n");
    assert!(peer.is_closed_by_socket());
    assert_eq!(rig.state(), ResponderState::Free);
}

#[test]
fn test_quit_ends_session() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);
    peer.take_output();

    peer.send_str("QUIT\r\n");
    rig.run(2);

    assert_eq!(peer.output_string(), "Goodbye.\r\n");
    assert!(peer.is_closed_by_socket());
    assert_eq!(rig.state(), ResponderState::Free);
}

#[test]
fn test_remote_close_frees_responder() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);

    peer.close();
    rig.run(1);

    assert_eq!(rig.state(), ResponderState::Free);
    assert!(!peer.socket_alive());
}

#[test]
fn test_responder_is_reused_after_quit() {
    let mut rig = rig("");
    let first = rig.connect();
    rig.run(1);
    first.send_str("exit\r\n");
    rig.run(2);
    assert_eq!(rig.state(), ResponderState::Free);

    let second = rig.connect();
    rig.run(1);

    assert_eq!(second.output_string(), "switchboard telnet session\r\n> ");
}

#[test]
fn test_slow_reader_holds_prompt_in_sending() {
    let mut rig = rig("");
    let peer = rig.connect();
    peer.set_capacity(Some(10));
    rig.run(1);

    assert_eq!(rig.state(), ResponderState::Sending);
    assert_eq!(peer.output_string(), "switchboar");

    peer.set_capacity(None);
    rig.run(1);

    assert_eq!(peer.output_string(), "d telnet session\r\n> ");
    assert_eq!(rig.state(), ResponderState::Reading);
}

#[test]
fn test_terminate_telnet_only() {
    let mut rig = rig("");
    let peer = rig.connect();
    rig.run(1);

    rig.stack.terminate(Protocol::Ftp, rig.now);
    assert_eq!(rig.state(), ResponderState::Reading);

    rig.stack.terminate(Protocol::Telnet, rig.now);
    assert_eq!(rig.state(), ResponderState::Free);
    assert!(peer.is_closed_by_socket());
}

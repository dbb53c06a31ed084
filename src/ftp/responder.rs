use bytes::{Bytes, BytesMut};
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};

use crate::config::FtpConfig;
use crate::ftp::command::Command;
use crate::net::{self, Context, Received, Socket, discard_line, take_line};
use crate::responder::output::{self, NetworkBuffer, OutputStack};
use crate::responder::state::ExtensionState;
use crate::responder::{
    DiagnosticSink, NetworkResponder, Protocol, ResponderCore, ResponderId, ResponderState, State,
};
use crate::storage::FileStore;

const CONTROL_READ: usize = 512;
const MAX_LINE: usize = 512;
const DATA_READ: usize = 1024;
const DATA_READS_PER_SPIN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpState {
    WaitingForDataPort,
    DataPortOpened,
    SendingDataChannel,
    DataTransferComplete,
}

impl ExtensionState for FtpState {
    fn flatten(self) -> ResponderState {
        match self {
            FtpState::WaitingForDataPort => ResponderState::WaitingForDataPort,
            FtpState::DataPortOpened => ResponderState::DataPortOpened,
            FtpState::SendingDataChannel => ResponderState::SendingDataChannel,
            FtpState::DataTransferComplete => ResponderState::DataTransferComplete,
        }
    }
}

pub struct FtpResponder {
    core: ResponderCore<FtpState>,
    settings: FtpConfig,
    inbound: BytesMut,
    user: Option<String>,
    logged_in: bool,

    data_port: Option<u16>,
    data_socket: Option<Box<dyn Socket>>,
    data_out: OutputStack,
    data_file: Option<Box<dyn FileStore>>,
    data_buffer: NetworkBuffer,
    data_inbound: BytesMut,
    transfer_ok: bool,
}

impl FtpResponder {
    pub fn new(id: ResponderId, settings: FtpConfig, file_chunk: usize) -> Self {
        Self {
            core: ResponderCore::new(id, Protocol::Ftp, file_chunk),
            settings,
            inbound: BytesMut::with_capacity(CONTROL_READ),
            user: None,
            logged_in: false,
            data_port: None,
            data_socket: None,
            data_out: OutputStack::new(),
            data_file: None,
            data_buffer: NetworkBuffer::new(file_chunk),
            data_inbound: BytesMut::with_capacity(DATA_READ),
            transfer_ok: false,
        }
    }

    pub fn core(&self) -> &ResponderCore<FtpState> {
        &self.core
    }

    /// The passive port currently open, if any.
    pub fn data_port(&self) -> Option<u16> {
        self.data_port
    }

    pub fn has_data_connection(&self) -> bool {
        self.data_socket.is_some()
    }

    fn respond(&mut self, ctx: &mut Context<'_>, code: u16, text: &str, next: State<FtpState>) {
        self.core.reply(&format!("{code} {text}\r\n"));
        self.core.commit(ctx, next);
    }

    /// Closes the data connection, the passive port and any transfer file.
    fn close_data(&mut self, ctx: &mut Context<'_>) {
        if let Some(socket) = self.data_socket.take() {
            socket.close();
        }
        if let Some(port) = self.data_port.take() {
            ctx.ports.close(port);
        }
        if let Some(file) = self.data_file.take() {
            if let Err(e) = file.close() {
                tracing::debug!(responder = %self.core.id(), error = %e, "Close of transfer file failed");
            }
        }
        self.data_out.clear();
        self.data_buffer.clear();
        self.data_inbound.clear();
    }

    fn reset_session(&mut self, ctx: &mut Context<'_>) {
        self.close_data(ctx);
        self.inbound.clear();
        self.user = None;
        self.logged_in = false;
        self.transfer_ok = false;
    }

    fn check_idle(&mut self, ctx: &mut Context<'_>) -> bool {
        self.core.ensure_timer(ctx.now_ms, self.settings.idle_timeout_ms);
        if !self.core.timer_expired(ctx.now_ms) {
            return false;
        }
        tracing::info!(responder = %self.core.id(), "FTP session idle, closing");
        self.close_data(ctx);
        self.respond(ctx, 421, "Idle timeout, closing control connection", State::Free);
        true
    }

    // ---- control channel ----

    fn do_commands(&mut self, ctx: &mut Context<'_>) -> bool {
        let mut progress = false;
        if !self.inbound.contains(&b'\n') {
            match self.core.receive(&mut self.inbound, CONTROL_READ) {
                Received::Data(_) => progress = true,
                Received::Idle => {}
                Received::Closed => {
                    self.close_data(ctx);
                    self.core.connection_lost(ctx);
                    return true;
                }
            }
        }

        if let Some(line) = take_line(&mut self.inbound) {
            self.core.arm_timer(ctx.now_ms, self.settings.idle_timeout_ms);
            self.handle_line(ctx, &line);
            return true;
        }

        if self.inbound.len() > MAX_LINE {
            discard_line(&mut self.inbound);
            let here = self.core.state();
            self.respond(ctx, 500, "Line too long", here);
            return true;
        }

        if progress {
            return true;
        }
        self.check_idle(ctx)
    }

    fn handle_line(&mut self, ctx: &mut Context<'_>, line: &str) {
        let Some(command) = Command::parse(line) else {
            return;
        };
        tracing::debug!(responder = %self.core.id(), command = command.verb(), "FTP command");

        let here = self.core.state();
        if command.needs_login() && !self.logged_in {
            return self.respond(ctx, 530, "Not logged in", here);
        }
        if command.uses_data_connection() && self.data_socket.is_none() {
            return self.respond(ctx, 425, "Use PASV first", here);
        }

        match command {
            Command::User(name) => {
                self.user = Some(name);
                if self.settings.password.is_empty() {
                    self.logged_in = true;
                    self.respond(ctx, 230, "User logged in", here);
                } else {
                    self.respond(ctx, 331, "Password required", here);
                }
            }
            Command::Pass(password) => {
                if self.user.is_none() {
                    self.respond(ctx, 503, "Login with USER first", here);
                } else if self.settings.password.is_empty() || password == self.settings.password {
                    self.logged_in = true;
                    self.respond(ctx, 230, "User logged in", here);
                } else {
                    tracing::warn!(responder = %self.core.id(), user = ?self.user, "FTP login failed");
                    self.respond(ctx, 530, "Login incorrect", here);
                }
            }
            Command::Syst => self.respond(ctx, 215, "UNIX Type: L8", here),
            Command::Pwd => self.respond(ctx, 257, "\"/\" is the current directory", here),
            Command::Type(_) => self.respond(ctx, 200, "Type set", here),
            Command::Noop => self.respond(ctx, 200, "OK", here),
            Command::Pasv => self.enter_passive(ctx),
            Command::List => self.start_list(ctx),
            Command::Retr(name) => self.start_retrieve(ctx, &name),
            Command::Stor(name) => self.start_store(ctx, &name),
            Command::Dele(name) => self.delete(ctx, &name, here),
            Command::Quit => {
                self.close_data(ctx);
                self.respond(ctx, 221, "Goodbye", State::Free);
            }
            Command::Unknown(_) => self.respond(ctx, 502, "Command not implemented", here),
        }
    }

    fn enter_passive(&mut self, ctx: &mut Context<'_>) {
        self.close_data(ctx);
        let port = match ctx.ports.open() {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), error = %e, "Cannot open data port");
                return self.respond(ctx, 425, "Can't open passive connection", State::Reading);
            }
        };
        self.data_port = Some(port);

        let ip = match self.core.socket().and_then(|s| s.local_addr()).map(|a| a.ip()) {
            Some(IpAddr::V4(ip)) => ip,
            _ => Ipv4Addr::LOCALHOST,
        };
        let [a, b, c, d] = ip.octets();
        let text = format!(
            "Entering Passive Mode ({a},{b},{c},{d},{},{})",
            port >> 8,
            port & 0xff
        );
        self.respond(ctx, 227, &text, State::Protocol(FtpState::WaitingForDataPort));
    }

    fn wait_for_data_port(&mut self, ctx: &mut Context<'_>) -> bool {
        let Some(port) = self.data_port else {
            self.respond(ctx, 425, "Can't open data connection", State::Reading);
            return true;
        };

        match ctx.ports.poll_accept(port) {
            Ok(Some(socket)) => {
                tracing::debug!(responder = %self.core.id(), port, peer = ?socket.remote_addr(), "Data connection opened");
                self.data_socket = Some(socket);
                ctx.ports.close(port);
                self.data_port = None;
                self.core.set_state(State::Protocol(FtpState::DataPortOpened));
                true
            }
            Ok(None) => {
                self.core.ensure_timer(ctx.now_ms, self.settings.data_port_timeout_ms);
                if !self.core.timer_expired(ctx.now_ms) {
                    return false;
                }
                tracing::warn!(responder = %self.core.id(), port, "Timed out waiting for data connection");
                self.close_data(ctx);
                self.respond(ctx, 425, "Can't open data connection", State::Reading);
                true
            }
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), port, error = %e, "Data port failed");
                self.close_data(ctx);
                self.respond(ctx, 425, "Can't open data connection", State::Reading);
                true
            }
        }
    }

    // ---- transfers ----

    fn start_list(&mut self, ctx: &mut Context<'_>) {
        let files = match ctx.files.list() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), error = %e, "Listing failed");
                self.close_data(ctx);
                return self.respond(ctx, 451, "Requested action aborted", State::Reading);
            }
        };

        let mut listing = String::new();
        for info in &files {
            let mode = if info.is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
            let _ = write!(
                listing,
                "{mode} 1 ftp ftp {:>12} Jan  1 00:00 {}\r\n",
                info.size, info.name
            );
        }
        self.data_out.push(Bytes::from(listing));
        self.respond(
            ctx,
            150,
            "Opening data connection for file list",
            State::Protocol(FtpState::SendingDataChannel),
        );
    }

    fn start_retrieve(&mut self, ctx: &mut Context<'_>, name: &str) {
        if name.is_empty() {
            return self.respond(ctx, 501, "Syntax error in parameters", self.core.state());
        }
        match ctx.files.open_read(name) {
            Ok(file) => {
                let text = format!("Opening data connection for {name} ({} bytes)", file.length());
                self.data_file = Some(file);
                self.respond(ctx, 150, &text, State::Protocol(FtpState::SendingDataChannel));
            }
            Err(e) => {
                tracing::debug!(responder = %self.core.id(), file = %name, error = %e, "RETR failed");
                self.close_data(ctx);
                self.respond(ctx, 550, "File not found", State::Reading);
            }
        }
    }

    fn start_store(&mut self, ctx: &mut Context<'_>, name: &str) {
        if name.is_empty() {
            return self.respond(ctx, 501, "Syntax error in parameters", self.core.state());
        }
        match ctx.files.open_write(name) {
            Ok(file) => {
                self.core.start_upload(ctx, file, name, None);
                self.respond(ctx, 150, "Ready to receive", State::Uploading);
            }
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %name, error = %e, "STOR failed");
                self.close_data(ctx);
                self.respond(ctx, 553, "Cannot create file", State::Reading);
            }
        }
    }

    fn delete(&mut self, ctx: &mut Context<'_>, name: &str, here: State<FtpState>) {
        if name.is_empty() {
            return self.respond(ctx, 501, "Syntax error in parameters", here);
        }
        match ctx.files.remove(name) {
            Ok(true) => self.respond(ctx, 250, "File deleted", here),
            Ok(false) => self.respond(ctx, 550, "File not found", here),
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %name, error = %e, "DELE failed");
                self.respond(ctx, 550, "Delete failed", here);
            }
        }
    }

    /// Writes queued listing bytes, then the file. Returns whether
    /// everything went out and how many bytes were written.
    fn pump_data(
        socket: &mut dyn Socket,
        out: &mut OutputStack,
        file: &mut Option<Box<dyn FileStore>>,
        staging: &mut NetworkBuffer,
    ) -> anyhow::Result<(bool, usize)> {
        let before = out.len();
        let remaining = out.write_to(socket)?;
        let mut written = before - remaining;
        if remaining > 0 {
            return Ok((false, written));
        }

        if let Some(f) = file.as_deref_mut() {
            let progress = output::pump_file(f, staging, socket)?;
            written += progress.written;
            if !progress.done {
                return Ok((false, written));
            }
            if let Some(f) = file.take() {
                f.close()?;
            }
        }
        Ok((true, written))
    }

    fn send_data_channel(&mut self, ctx: &mut Context<'_>) -> bool {
        let Some(socket) = self.data_socket.as_deref_mut() else {
            self.transfer_ok = false;
            self.core.set_state(State::Protocol(FtpState::DataTransferComplete));
            return true;
        };

        let outcome = Self::pump_data(
            socket,
            &mut self.data_out,
            &mut self.data_file,
            &mut self.data_buffer,
        );
        match outcome {
            Ok((true, _)) => {
                self.close_data(ctx);
                self.transfer_ok = true;
                self.core.set_state(State::Protocol(FtpState::DataTransferComplete));
                true
            }
            Ok((false, written)) if written > 0 => {
                self.core.arm_timer(ctx.now_ms, self.settings.idle_timeout_ms);
                true
            }
            Ok((false, _)) => {
                self.core.ensure_timer(ctx.now_ms, self.settings.idle_timeout_ms);
                if !self.core.timer_expired(ctx.now_ms) {
                    return false;
                }
                tracing::warn!(responder = %self.core.id(), "Data transfer stalled");
                self.abort_transfer(ctx);
                true
            }
            Err(e) => {
                tracing::debug!(responder = %self.core.id(), error = %e, "Data transfer failed");
                self.abort_transfer(ctx);
                true
            }
        }
    }

    fn abort_transfer(&mut self, ctx: &mut Context<'_>) {
        self.close_data(ctx);
        self.transfer_ok = false;
        self.core.set_state(State::Protocol(FtpState::DataTransferComplete));
    }

    fn complete_transfer(&mut self, ctx: &mut Context<'_>) -> bool {
        let ok = std::mem::take(&mut self.transfer_ok);
        if ok {
            self.respond(ctx, 226, "Transfer complete", State::Reading);
        } else {
            self.respond(ctx, 426, "Connection closed; transfer aborted", State::Reading);
        }
        true
    }

    fn do_receiving(&mut self, ctx: &mut Context<'_>) -> bool {
        let mut progress = false;
        for _ in 0..DATA_READS_PER_SPIN {
            let Some(socket) = self.data_socket.as_deref_mut() else {
                self.finish_store(ctx);
                return true;
            };
            match net::receive(socket, &mut self.data_inbound, DATA_READ) {
                Received::Data(_) => {
                    progress = true;
                    let chunk = self.data_inbound.split();
                    self.core.write_upload(&chunk);
                }
                Received::Idle => break,
                Received::Closed => {
                    self.finish_store(ctx);
                    return true;
                }
            }
        }

        if progress {
            self.core.arm_timer(ctx.now_ms, self.settings.idle_timeout_ms);
            return true;
        }
        self.core.ensure_timer(ctx.now_ms, self.settings.idle_timeout_ms);
        if self.core.timer_expired(ctx.now_ms) {
            tracing::warn!(responder = %self.core.id(), "Upload stalled");
            self.close_data(ctx);
            self.core.connection_lost(ctx);
            return true;
        }
        false
    }

    /// The sender closed the data connection: keep what arrived.
    fn finish_store(&mut self, ctx: &mut Context<'_>) {
        let received = self.core.upload().bytes_written();
        let committed = self.core.finish_upload(ctx, received, None);
        self.close_data(ctx);
        if committed {
            self.respond(ctx, 226, "Transfer complete", State::Reading);
        } else {
            self.respond(ctx, 550, "Transfer failed, file discarded", State::Reading);
        }
    }

    fn do_sending(&mut self, ctx: &mut Context<'_>) -> bool {
        if self.core.send_data(ctx) {
            if self.core.state() == State::Sending {
                self.core.arm_timer(ctx.now_ms, self.settings.idle_timeout_ms);
            }
            return true;
        }
        self.core.ensure_timer(ctx.now_ms, self.settings.idle_timeout_ms);
        if self.core.timer_expired(ctx.now_ms) {
            self.close_data(ctx);
            self.core.connection_lost(ctx);
            return true;
        }
        false
    }
}

impl NetworkResponder for FtpResponder {
    fn id(&self) -> ResponderId {
        self.core.id()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    fn state(&self) -> ResponderState {
        self.core.state().flatten()
    }

    fn spin(&mut self, ctx: &mut Context<'_>) -> bool {
        let progress = match self.core.state() {
            State::Free => return false,
            State::Reading => self.do_commands(ctx),
            State::Sending => self.do_sending(ctx),
            State::Uploading => self.do_receiving(ctx),
            State::Protocol(FtpState::WaitingForDataPort) => self.wait_for_data_port(ctx),
            State::Protocol(FtpState::DataPortOpened) => self.do_commands(ctx),
            State::Protocol(FtpState::SendingDataChannel) => self.send_data_channel(ctx),
            State::Protocol(FtpState::DataTransferComplete) => self.complete_transfer(ctx),
        };
        // A failed commit can free the core underneath us.
        if self.core.is_free() {
            self.reset_session(ctx);
        }
        progress
    }

    fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        ctx: &mut Context<'_>,
    ) -> Result<(), Box<dyn Socket>> {
        if protocol != Protocol::Ftp || !self.core.is_free() {
            return Err(socket);
        }
        self.reset_session(ctx);
        self.core.bind(socket, State::Reading);
        self.respond(ctx, 220, "switchboard FTP ready", State::Reading);
        Ok(())
    }

    fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>) {
        if protocol == Protocol::Ftp {
            self.close_data(ctx);
            self.core.terminate(ctx);
            self.reset_session(ctx);
        }
    }

    fn connection_lost(&mut self, ctx: &mut Context<'_>) {
        self.close_data(ctx);
        self.core.connection_lost(ctx);
        self.reset_session(ctx);
    }

    fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        sink.report(self.core.snapshot());
    }
}

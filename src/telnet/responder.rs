use bytes::BytesMut;

use crate::config::TelnetConfig;
use crate::net::{Context, Received, Socket, discard_line, take_line};
use crate::responder::state::ExtensionState;
use crate::responder::{
    DiagnosticSink, NetworkResponder, Protocol, ResponderCore, ResponderId, ResponderState, State,
};
use crate::telnet::iac::IacFilter;

const READ_CHUNK: usize = 256;
const MAX_LINE: usize = 256;

const BANNER: &str = "switchboard telnet session\r\n";
const PROMPT: &str = "> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetState {
    JustConnected,
    Authenticating,
}

impl ExtensionState for TelnetState {
    fn flatten(self) -> ResponderState {
        match self {
            TelnetState::JustConnected => ResponderState::JustConnected,
            TelnetState::Authenticating => ResponderState::Authenticating,
        }
    }
}

enum Input {
    Line(String),
    Waiting { progress: bool },
    Closed,
}

pub struct TelnetResponder {
    core: ResponderCore<TelnetState>,
    settings: TelnetConfig,
    raw: BytesMut,
    lines: BytesMut,
    iac: IacFilter,
}

impl TelnetResponder {
    pub fn new(id: ResponderId, settings: TelnetConfig, file_chunk: usize) -> Self {
        Self {
            core: ResponderCore::new(id, Protocol::Telnet, file_chunk),
            settings,
            raw: BytesMut::with_capacity(READ_CHUNK),
            lines: BytesMut::with_capacity(MAX_LINE),
            iac: IacFilter::new(),
        }
    }

    pub fn core(&self) -> &ResponderCore<TelnetState> {
        &self.core
    }

    fn poll_line(&mut self) -> Input {
        let mut progress = false;
        if !self.lines.contains(&b'\n') {
            match self.core.receive(&mut self.raw, READ_CHUNK) {
                Received::Data(_) => {
                    self.iac.filter(&self.raw, &mut self.lines);
                    self.raw.clear();
                    progress = true;
                }
                Received::Idle => {}
                Received::Closed => return Input::Closed,
            }
        }

        if let Some(line) = take_line(&mut self.lines) {
            return Input::Line(line.trim().to_string());
        }
        if self.lines.len() > MAX_LINE {
            tracing::debug!(responder = %self.core.id(), "Dropping over-long line");
            discard_line(&mut self.lines);
        }
        Input::Waiting { progress }
    }

    fn greet(&mut self, ctx: &mut Context<'_>) -> bool {
        self.core.reply(BANNER);
        if self.settings.password.is_empty() {
            self.core.reply(PROMPT);
            self.core.commit(ctx, State::Reading);
        } else {
            self.core.reply("Password: ");
            self.core
                .commit(ctx, State::Protocol(TelnetState::Authenticating));
        }
        true
    }

    fn authenticate(&mut self, ctx: &mut Context<'_>) -> bool {
        let password = match self.poll_line() {
            Input::Line(line) => line,
            Input::Waiting { progress } => return progress,
            Input::Closed => {
                self.core.connection_lost(ctx);
                return true;
            }
        };

        if password == self.settings.password {
            tracing::info!(responder = %self.core.id(), "Telnet login");
            self.core.reply("Logged in.\r\n");
            self.core.reply(PROMPT);
            self.core.commit(ctx, State::Reading);
        } else {
            tracing::warn!(responder = %self.core.id(), "Telnet login failed");
            self.core.reply("Invalid password.\r\n");
            self.core.commit(ctx, State::Free);
        }
        true
    }

    fn read_command(&mut self, ctx: &mut Context<'_>) -> bool {
        let line = match self.poll_line() {
            Input::Line(line) => line,
            Input::Waiting { progress } => return progress,
            Input::Closed => {
                self.core.connection_lost(ctx);
                return true;
            }
        };

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            self.core.reply("Goodbye.\r\n");
            self.core.commit(ctx, State::Free);
            return true;
        }

        if !line.is_empty() {
            if let Some(reply) = ctx.commands.handle_line(self.core.id(), &line) {
                self.core.reply(&reply);
                self.core.reply("\r\n");
            }
        }
        self.core.reply(PROMPT);
        self.core.commit(ctx, State::Reading);
        true
    }

    fn clear_session(&mut self) {
        self.raw.clear();
        self.lines.clear();
        self.iac.reset();
    }
}

impl NetworkResponder for TelnetResponder {
    fn id(&self) -> ResponderId {
        self.core.id()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Telnet
    }

    fn state(&self) -> ResponderState {
        self.core.state().flatten()
    }

    fn spin(&mut self, ctx: &mut Context<'_>) -> bool {
        match self.core.state() {
            // Line sessions never receive files.
            State::Free | State::Uploading => false,
            State::Protocol(TelnetState::JustConnected) => self.greet(ctx),
            State::Protocol(TelnetState::Authenticating) => self.authenticate(ctx),
            State::Reading => self.read_command(ctx),
            State::Sending => self.core.send_data(ctx),
        }
    }

    fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        _ctx: &mut Context<'_>,
    ) -> Result<(), Box<dyn Socket>> {
        if protocol != Protocol::Telnet || !self.core.is_free() {
            return Err(socket);
        }
        self.clear_session();
        self.core
            .bind(socket, State::Protocol(TelnetState::JustConnected));
        Ok(())
    }

    fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>) {
        if protocol == Protocol::Telnet {
            self.core.terminate(ctx);
            self.clear_session();
        }
    }

    fn connection_lost(&mut self, ctx: &mut Context<'_>) {
        self.core.connection_lost(ctx);
        self.clear_session();
    }

    fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        sink.report(self.core.snapshot());
    }
}

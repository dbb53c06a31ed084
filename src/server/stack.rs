//! The stack: responders plus everything they share.
//!
//! Callers hand over accepted sockets and call [`Stack::poll`] regularly.
//! Each call builds a fresh [`Context`] from the shared pieces and spins
//! every active responder once.

use crate::config::Config;
use crate::ftp::FtpResponder;
use crate::http::HttpResponder;
use crate::net::{CommandHandler, Context, DataPorts, Socket};
use crate::responder::{
    DiagnosticSink, NetworkResponder, Protocol, ResourceLock, Responder, ResponderId,
    ResponderRegistry,
};
use crate::storage::FileSystem;
use crate::telnet::TelnetResponder;

pub struct Stack {
    registry: ResponderRegistry,
    lock: ResourceLock,
    files: Box<dyn FileSystem>,
    ports: Box<dyn DataPorts>,
    commands: Box<dyn CommandHandler>,
}

impl Stack {
    pub fn new(
        registry: ResponderRegistry,
        files: Box<dyn FileSystem>,
        ports: Box<dyn DataPorts>,
        commands: Box<dyn CommandHandler>,
    ) -> Self {
        Self {
            registry,
            lock: ResourceLock::new(),
            files,
            ports,
            commands,
        }
    }

    /// Allocates the responders `cfg` asks for, HTTP first, then FTP, then
    /// Telnet.
    pub fn from_config(
        cfg: &Config,
        files: Box<dyn FileSystem>,
        ports: Box<dyn DataPorts>,
        commands: Box<dyn CommandHandler>,
    ) -> anyhow::Result<Self> {
        let counts = &cfg.responders;
        let chunk = cfg.buffers.file_chunk;
        let mut registry = ResponderRegistry::new(counts.total());

        for _ in 0..counts.http {
            registry.push_with(|id| Responder::Http(HttpResponder::new(id, cfg.http.clone(), chunk)))?;
        }
        for _ in 0..counts.ftp {
            registry.push_with(|id| Responder::Ftp(FtpResponder::new(id, cfg.ftp.clone(), chunk)))?;
        }
        for _ in 0..counts.telnet {
            registry.push_with(|id| {
                Responder::Telnet(TelnetResponder::new(id, cfg.telnet.clone(), chunk))
            })?;
        }

        tracing::info!(
            http = counts.http,
            ftp = counts.ftp,
            telnet = counts.telnet,
            "Responders allocated"
        );
        Ok(Self::new(registry, files, ports, commands))
    }

    fn with_context<R>(
        &mut self,
        now_ms: u64,
        f: impl FnOnce(&mut ResponderRegistry, &mut Context<'_>) -> R,
    ) -> R {
        let Self {
            registry,
            lock,
            files,
            ports,
            commands,
        } = self;
        let mut ctx = Context {
            now_ms,
            lock,
            files: &mut **files,
            ports: &mut **ports,
            commands: &mut **commands,
        };
        f(registry, &mut ctx)
    }

    /// Offers a new connection to the responders. Gives the socket back if
    /// none is free for `protocol`.
    pub fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        now_ms: u64,
    ) -> Result<ResponderId, Box<dyn Socket>> {
        self.with_context(now_ms, |registry, ctx| registry.accept(socket, protocol, ctx))
    }

    /// One scheduling pass. Returns whether any responder made progress.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        self.with_context(now_ms, |registry, ctx| registry.spin(ctx))
    }

    pub fn terminate(&mut self, protocol: Protocol, now_ms: u64) {
        self.with_context(now_ms, |registry, ctx| registry.terminate(protocol, ctx))
    }

    /// Tells one responder its connection is gone. Returns `false` for an
    /// unknown id.
    pub fn connection_lost(&mut self, id: ResponderId, now_ms: u64) -> bool {
        self.with_context(now_ms, |registry, ctx| match registry.get_mut(id) {
            Some(responder) => {
                responder.connection_lost(ctx);
                true
            }
            None => false,
        })
    }

    pub fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        self.registry.diagnostics(sink);
    }

    pub fn registry(&self) -> &ResponderRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &ResourceLock {
        &self.lock
    }
}

//! Responder framework.
//!
//! A responder is a resumable state machine serving one connection at a
//! time. Responders are allocated once, live in a [`ResponderRegistry`],
//! and cycle between `Free` and active states for the life of the process.
//!
//! # Architecture
//!
//! - **`state`**: protocol tags and the state enums
//! - **`lock`**: the single-owner lock shared between responders
//! - **`output`**: pending output buffers and file streaming
//! - **`upload`**: bookkeeping for a file being received
//! - **`core`**: the shared state and transition primitives every protocol reuses
//! - **`registry`**: the fixed set of responders the scheduler walks
//! - **`diagnostics`**: snapshots and report sinks
//!
//! # State machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Free     │ ← accept() binds a socket
//!        └──────┬──────┘
//!               │ protocol start state (Reading, JustConnected, ...)
//!               ▼
//!        ┌──────────────────┐   start_upload()   ┌─────────────┐
//!        │ Reading / proto  │ ─────────────────▶ │  Uploading  │
//!        └──────┬───────────┘ ◀───────────────── └─────────────┘
//!               │ commit(next)       finish/cancel_upload()
//!               ├─ output flushed     → next
//!               └─ output pending     → Sending (resume = next)
//!                                          │ send_data() drains
//!                                          └─▶ next (Free releases all)
//! ```
//!
//! `terminate()` and `connection_lost()` reach `Free` from any state in one
//! call, releasing the socket, the lock and any partial upload.

pub mod core;
pub mod diagnostics;
pub mod lock;
pub mod output;
pub mod registry;
pub mod state;
pub mod upload;

pub use self::core::ResponderCore;
pub use diagnostics::{DiagnosticSink, ResponderSnapshot, TracingSink, YamlSink};
pub use lock::{ResourceLock, ResponderId};
pub use registry::ResponderRegistry;
pub use state::{Protocol, ResponderState, State};
pub use upload::UploadTracker;

use crate::ftp::FtpResponder;
use crate::http::responder::HttpResponder;
use crate::net::{Context, Socket};
use crate::telnet::TelnetResponder;

/// Lifecycle every protocol responder implements.
pub trait NetworkResponder {
    fn id(&self) -> ResponderId;

    /// The protocol this responder serves.
    fn protocol(&self) -> Protocol;

    fn state(&self) -> ResponderState;

    /// Does one bounded piece of work. Returns whether anything significant
    /// happened. A `Free` responder does nothing and returns `false`.
    fn spin(&mut self, ctx: &mut Context<'_>) -> bool;

    /// Takes the connection if free and serving `protocol`; otherwise hands
    /// the socket straight back untouched.
    fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        ctx: &mut Context<'_>,
    ) -> Result<(), Box<dyn Socket>>;

    /// Ends the session if it serves `protocol`.
    fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>);

    /// The transport reports the connection gone.
    fn connection_lost(&mut self, ctx: &mut Context<'_>);

    fn diagnostics(&self, sink: &mut dyn DiagnosticSink);
}

/// The closed set of responder kinds.
pub enum Responder {
    Http(HttpResponder),
    Ftp(FtpResponder),
    Telnet(TelnetResponder),
}

impl Responder {
    fn inner(&self) -> &dyn NetworkResponder {
        match self {
            Responder::Http(r) => r,
            Responder::Ftp(r) => r,
            Responder::Telnet(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn NetworkResponder {
        match self {
            Responder::Http(r) => r,
            Responder::Ftp(r) => r,
            Responder::Telnet(r) => r,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state() == ResponderState::Free
    }
}

impl NetworkResponder for Responder {
    fn id(&self) -> ResponderId {
        self.inner().id()
    }

    fn protocol(&self) -> Protocol {
        self.inner().protocol()
    }

    fn state(&self) -> ResponderState {
        self.inner().state()
    }

    fn spin(&mut self, ctx: &mut Context<'_>) -> bool {
        self.inner_mut().spin(ctx)
    }

    fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        ctx: &mut Context<'_>,
    ) -> Result<(), Box<dyn Socket>> {
        self.inner_mut().accept(socket, protocol, ctx)
    }

    fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>) {
        self.inner_mut().terminate(protocol, ctx)
    }

    fn connection_lost(&mut self, ctx: &mut Context<'_>) {
        self.inner_mut().connection_lost(ctx)
    }

    fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        self.inner().diagnostics(sink)
    }
}

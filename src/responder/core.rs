//! State and transition primitives shared by every responder.
//!
//! Protocol responders embed a [`ResponderCore`] and drive it from their
//! `spin`. The core owns the bound socket, the pending output, the file
//! being sent and the upload in progress, and guarantees that all of them
//! are released on the way back to `Free`.

use bytes::BytesMut;
use std::time::SystemTime;

use crate::net::{self, Context, Received, Socket};
use crate::responder::diagnostics::ResponderSnapshot;
use crate::responder::lock::ResponderId;
use crate::responder::output::{self, NetworkBuffer, OutputBuffer, OutputStack};
use crate::responder::state::{ExtensionState, Protocol, State};
use crate::responder::upload::UploadTracker;
use crate::storage::FileStore;

/// Counters kept across connections, for reporting only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponderStats {
    pub connections: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

pub struct ResponderCore<X> {
    id: ResponderId,
    protocol: Protocol,
    state: State<X>,
    state_after_sending: State<X>,
    socket: Option<Box<dyn Socket>>,
    /// Deadline in stack milliseconds; cleared on every state change.
    timer: Option<u64>,

    out_buf: OutputBuffer,
    out_stack: OutputStack,
    file_being_sent: Option<Box<dyn FileStore>>,
    file_buffer: NetworkBuffer,

    upload: UploadTracker,
    stats: ResponderStats,
}

impl<X: ExtensionState> ResponderCore<X> {
    pub fn new(id: ResponderId, protocol: Protocol, file_chunk: usize) -> Self {
        Self {
            id,
            protocol,
            state: State::Free,
            state_after_sending: State::Free,
            socket: None,
            timer: None,
            out_buf: OutputBuffer::new(),
            out_stack: OutputStack::new(),
            file_being_sent: None,
            file_buffer: NetworkBuffer::new(file_chunk),
            upload: UploadTracker::new(),
            stats: ResponderStats::default(),
        }
    }

    pub fn id(&self) -> ResponderId {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn state(&self) -> State<X> {
        self.state
    }

    pub fn state_after_sending(&self) -> State<X> {
        self.state_after_sending
    }

    pub fn is_free(&self) -> bool {
        self.state == State::Free
    }

    pub fn is_connected(&self) -> bool {
        self.socket.as_ref().is_some_and(|s| s.is_connected())
    }

    pub fn socket(&self) -> Option<&dyn Socket> {
        self.socket.as_deref()
    }

    pub fn stats(&self) -> ResponderStats {
        self.stats
    }

    /// Claims `socket` and enters `initial`. Only valid while `Free`.
    pub fn bind(&mut self, socket: Box<dyn Socket>, initial: State<X>) {
        debug_assert!(self.is_free(), "bind on a busy responder");
        tracing::info!(
            responder = %self.id,
            protocol = %self.protocol,
            peer = ?socket.remote_addr(),
            "Accepted connection"
        );
        self.socket = Some(socket);
        self.stats.connections += 1;
        self.enter(initial);
    }

    /// Moves to `next` without touching output. Use [`commit`](Self::commit)
    /// to reach `Free`.
    pub fn set_state(&mut self, next: State<X>) {
        debug_assert!(next != State::Free, "use commit to free a responder");
        self.enter(next);
    }

    fn enter(&mut self, next: State<X>) {
        if self.state != next {
            tracing::trace!(
                responder = %self.id,
                from = ?self.state.flatten(),
                to = ?next.flatten(),
                "State change"
            );
            self.timer = None;
        }
        self.state = next;
    }

    // ---- timer ----

    /// Sets the deadline to `timeout_ms` from now.
    pub fn arm_timer(&mut self, now_ms: u64, timeout_ms: u64) {
        self.timer = Some(now_ms.saturating_add(timeout_ms));
    }

    /// Arms the timer unless it is already running in this state.
    pub fn ensure_timer(&mut self, now_ms: u64, timeout_ms: u64) {
        if self.timer.is_none() {
            self.arm_timer(now_ms, timeout_ms);
        }
    }

    pub fn timer_expired(&self, now_ms: u64) -> bool {
        self.timer.is_some_and(|deadline| now_ms >= deadline)
    }

    pub fn timer(&self) -> Option<u64> {
        self.timer
    }

    // ---- input ----

    /// Reads once from the bound socket into `dst`, at most `max` bytes.
    pub fn receive(&mut self, dst: &mut BytesMut, max: usize) -> Received {
        let Some(socket) = self.socket.as_deref_mut() else {
            return Received::Closed;
        };
        let received = net::receive(socket, dst, max);
        if let Received::Data(n) = received {
            self.stats.bytes_received += n as u64;
        }
        received
    }

    // ---- output ----

    pub fn output(&mut self) -> &mut OutputBuffer {
        &mut self.out_buf
    }

    pub fn output_stack(&mut self) -> &mut OutputStack {
        &mut self.out_stack
    }

    /// Appends `text` to the pending output.
    pub fn reply(&mut self, text: &str) {
        self.out_buf.push_str(text);
    }

    /// Queues `file` to be streamed after the buffered output.
    pub fn send_file(&mut self, file: Box<dyn FileStore>) {
        if let Some(previous) = self.file_being_sent.replace(file) {
            if let Err(e) = previous.close() {
                tracing::debug!(responder = %self.id, error = %e, "Close of replaced file failed");
            }
        }
        self.file_buffer.clear();
    }

    pub fn pending_output(&self) -> usize {
        self.out_buf.len() + self.out_stack.len() + self.file_buffer.len()
    }

    pub fn has_pending_output(&self) -> bool {
        !self.out_buf.is_empty()
            || !self.out_stack.is_empty()
            || !self.file_buffer.is_empty()
            || self.file_being_sent.is_some()
    }

    /// Pushes out as much pending output as the socket takes.
    /// Returns `Ok(true)` once nothing is left.
    fn flush(&mut self) -> anyhow::Result<bool> {
        let Some(socket) = self.socket.as_deref_mut() else {
            anyhow::bail!("no socket bound");
        };
        let before = self.out_buf.len() + self.out_stack.len();

        let mut remaining = self.out_buf.write_to(socket)?;
        if remaining == 0 {
            // Preserve order: only the buffer's leftovers block the stack.
            remaining = self.out_stack.write_to(socket)?;
        } else {
            remaining += self.out_stack.len();
        }
        self.stats.bytes_sent += (before - remaining) as u64;

        if remaining > 0 {
            return Ok(false);
        }

        if let Some(file) = self.file_being_sent.as_deref_mut() {
            let progress = output::pump_file(file, &mut self.file_buffer, socket)?;
            self.stats.bytes_sent += progress.written as u64;
            if !progress.done {
                return Ok(false);
            }
            if let Some(file) = self.file_being_sent.take() {
                file.close()?;
            }
        }
        Ok(true)
    }

    /// Flushes pending output and then enters `next`.
    ///
    /// If the socket cannot take everything now, the responder enters
    /// `Sending` instead and remembers `next`; [`send_data`](Self::send_data)
    /// finishes the job on later spins. Entering `Free` releases the socket,
    /// the resource lock and any upload.
    pub fn commit(&mut self, ctx: &mut Context<'_>, next: State<X>) {
        if self.socket.is_none() {
            self.release(ctx);
            return;
        }

        match self.flush() {
            Ok(true) => self.finish_sending(ctx, next),
            Ok(false) => {
                self.state_after_sending = next;
                self.enter(State::Sending);
            }
            Err(e) => {
                tracing::debug!(responder = %self.id, error = %e, "Send failed during commit");
                self.connection_lost(ctx);
            }
        }
    }

    /// Continues a deferred commit. Safe to call again and again while data
    /// remains; enters the recorded resume state once everything is out.
    /// Returns whether any progress was made.
    pub fn send_data(&mut self, ctx: &mut Context<'_>) -> bool {
        if self.state != State::Sending {
            return false;
        }
        let sent_before = self.stats.bytes_sent;
        let pending_before = self.pending_output();

        match self.flush() {
            Ok(true) => {
                let next = self.state_after_sending;
                self.finish_sending(ctx, next);
                true
            }
            Ok(false) => {
                self.stats.bytes_sent != sent_before || self.pending_output() != pending_before
            }
            Err(e) => {
                tracing::debug!(responder = %self.id, error = %e, "Send failed");
                self.connection_lost(ctx);
                true
            }
        }
    }

    fn finish_sending(&mut self, ctx: &mut Context<'_>, next: State<X>) {
        self.state_after_sending = State::Free;
        if next == State::Free {
            self.release(ctx);
        } else {
            self.enter(next);
        }
    }

    /// Normal end of a session: gives the socket back and resets.
    fn release(&mut self, ctx: &mut Context<'_>) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        tracing::debug!(responder = %self.id, "Responder released");
        self.reset(ctx);
    }

    /// The transport reports the connection gone. Drops everything in
    /// flight and returns to `Free`. Does nothing if already `Free`.
    pub fn connection_lost(&mut self, ctx: &mut Context<'_>) {
        if self.is_free() && self.socket.is_none() {
            return;
        }
        tracing::warn!(
            responder = %self.id,
            protocol = %self.protocol,
            state = ?self.state.flatten(),
            "Connection lost"
        );
        // Closing after a loss just hands the dead socket back.
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.reset(ctx);
    }

    /// Forced end of the session. Idempotent.
    pub fn terminate(&mut self, ctx: &mut Context<'_>) {
        if self.is_free() && self.socket.is_none() {
            return;
        }
        tracing::info!(responder = %self.id, protocol = %self.protocol, "Session terminated");
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.reset(ctx);
    }

    fn reset(&mut self, ctx: &mut Context<'_>) {
        ctx.lock.release(self.id);
        self.upload.cancel(ctx.files);
        self.out_buf.clear();
        self.out_stack.clear();
        self.file_buffer.clear();
        if let Some(file) = self.file_being_sent.take() {
            if let Err(e) = file.close() {
                tracing::debug!(responder = %self.id, error = %e, "Close of unsent file failed");
            }
        }
        self.state_after_sending = State::Free;
        self.enter(State::Free);
    }

    // ---- uploads ----

    pub fn upload(&self) -> &UploadTracker {
        &self.upload
    }

    /// Starts receiving into `file` and enters `Uploading`.
    ///
    /// Callers must not start a second upload while one is running; if
    /// they do, the first is cancelled so its handle is not leaked.
    pub fn start_upload(
        &mut self,
        ctx: &mut Context<'_>,
        file: Box<dyn FileStore>,
        name: &str,
        declared_length: Option<u64>,
    ) {
        debug_assert!(!self.upload.is_active(), "upload already in progress");
        if self.upload.is_active() {
            self.upload.cancel(ctx.files);
        }
        tracing::info!(responder = %self.id, file = %name, length = ?declared_length, "Upload started");
        self.upload.start(file, name, declared_length);
        self.enter(State::Uploading);
    }

    /// Feeds received bytes to the upload. Returns the bytes consumed.
    pub fn write_upload(&mut self, data: &[u8]) -> usize {
        self.upload.write(data)
    }

    /// Ends the upload, keeping the file only if exactly `expected_length`
    /// bytes were written without error. Leaves `Uploading` for `Reading`.
    pub fn finish_upload(
        &mut self,
        ctx: &mut Context<'_>,
        expected_length: u64,
        last_modified: Option<SystemTime>,
    ) -> bool {
        let committed = self.upload.finish(ctx.files, expected_length, last_modified);
        if self.state == State::Uploading {
            self.enter(State::Reading);
        }
        committed
    }

    /// Throws away the upload in progress, whatever its progress.
    pub fn cancel_upload(&mut self, ctx: &mut Context<'_>) {
        self.upload.cancel(ctx.files);
        if self.state == State::Uploading {
            self.enter(State::Reading);
        }
    }

    pub fn snapshot(&self) -> ResponderSnapshot {
        ResponderSnapshot {
            id: self.id,
            protocol: self.protocol,
            state: self.state.flatten(),
            resume_state: (self.state == State::Sending).then(|| self.state_after_sending.flatten()),
            remote: self
                .socket
                .as_ref()
                .and_then(|s| s.remote_addr())
                .map(|a| a.to_string()),
            pending_output: self.pending_output(),
            upload: self.upload.snapshot(),
            connections: self.stats.connections,
            bytes_sent: self.stats.bytes_sent,
            bytes_received: self.stats.bytes_received,
        }
    }
}

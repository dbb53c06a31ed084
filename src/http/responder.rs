//! Request/response responder.
//!
//! Serves files from the file store, accepts uploads streamed straight into
//! files, and deletes files. Looking up file metadata goes through the
//! shared resource lock because a lookup may span several spins.

use bytes::{Buf, BytesMut};
use std::task::Poll;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::HttpConfig;
use crate::http::mime;
use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::{Method, Request, Target};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::writer::write_head;
use crate::net::{Context, Received, Socket};
use crate::responder::state::ExtensionState;
use crate::responder::{
    DiagnosticSink, NetworkResponder, Protocol, ResponderCore, ResponderId, ResponderState, State,
};
use crate::storage::FileInfo;

const READ_CHUNK: usize = 1024;
const UPLOAD_READS_PER_SPIN: usize = 8;

const UPLOAD_OK: &str = r#"{"err":0}"#;
const UPLOAD_FAILED: &str = r#"{"err":1}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    WaitingForResourceLock,
    FetchingResourceInfo,
}

impl ExtensionState for HttpState {
    fn flatten(self) -> ResponderState {
        match self {
            HttpState::WaitingForResourceLock => ResponderState::WaitingForResourceLock,
            HttpState::FetchingResourceInfo => ResponderState::FetchingResourceInfo,
        }
    }
}

pub struct HttpResponder {
    core: ResponderCore<HttpState>,
    settings: HttpConfig,
    inbound: BytesMut,
    request: Option<Request>,
    file_path: String,
    keep_alive: bool,
    upload_length: u64,
    upload_remaining: u64,
    upload_time: Option<SystemTime>,
}

impl HttpResponder {
    pub fn new(id: ResponderId, settings: HttpConfig, file_chunk: usize) -> Self {
        Self {
            core: ResponderCore::new(id, Protocol::Http, file_chunk),
            settings,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            request: None,
            file_path: String::new(),
            keep_alive: false,
            upload_length: 0,
            upload_remaining: 0,
            upload_time: None,
        }
    }

    pub fn core(&self) -> &ResponderCore<HttpState> {
        &self.core
    }

    fn clear_session(&mut self) {
        self.inbound.clear();
        self.request = None;
        self.file_path.clear();
        self.keep_alive = false;
        self.upload_length = 0;
        self.upload_remaining = 0;
        self.upload_time = None;
    }

    /// Gives up a file lookup still in flight.
    fn abandon_lookup(&mut self, ctx: &mut Context<'_>) {
        if self.core.state() == State::Protocol(HttpState::FetchingResourceInfo) {
            ctx.files.cancel_file_info(&self.file_path);
        }
    }

    fn timeout(&self) -> u64 {
        self.settings.session_timeout_ms
    }

    /// Queues `resp` and commits to the next request or to closing.
    fn respond(&mut self, ctx: &mut Context<'_>, resp: Response) {
        let resp = if self.keep_alive { resp } else { resp.closing() };
        tracing::debug!(
            responder = %self.core.id(),
            status = resp.status.as_u16(),
            keep_alive = self.keep_alive,
            "Response queued"
        );
        write_head(&resp, self.core.output());
        self.core.output_stack().push(resp.body);
        self.request = None;
        let next = if self.keep_alive { State::Reading } else { State::Free };
        self.core.commit(ctx, next);
    }

    /// Responds and closes the connection afterwards.
    fn fail(&mut self, ctx: &mut Context<'_>, resp: Response) {
        self.keep_alive = false;
        self.respond(ctx, resp);
    }

    fn timed_out(&mut self, ctx: &mut Context<'_>, what: &str) -> bool {
        self.core.ensure_timer(ctx.now_ms, self.timeout());
        if !self.core.timer_expired(ctx.now_ms) {
            return false;
        }
        tracing::debug!(responder = %self.core.id(), waiting_for = what, "HTTP session timed out");
        self.abandon_lookup(ctx);
        self.core.connection_lost(ctx);
        self.clear_session();
        true
    }

    // ---- Reading ----

    fn do_reading(&mut self, ctx: &mut Context<'_>) -> bool {
        if self.try_request(ctx) {
            return true;
        }

        match self.core.receive(&mut self.inbound, READ_CHUNK) {
            Received::Data(_) => {
                self.core.arm_timer(ctx.now_ms, self.timeout());
                self.try_request(ctx);
                true
            }
            Received::Idle => self.timed_out(ctx, "request"),
            Received::Closed => {
                self.core.connection_lost(ctx);
                self.clear_session();
                true
            }
        }
    }

    /// Parses and dispatches a buffered request head, if complete.
    fn try_request(&mut self, ctx: &mut Context<'_>) -> bool {
        match parse_request_head(&self.inbound) {
            Ok((request, consumed)) => {
                self.inbound.advance(consumed);
                self.handle_request(ctx, request);
                true
            }
            Err(ParseError::Incomplete) => {
                if self.inbound.len() > self.settings.max_head_bytes {
                    tracing::warn!(responder = %self.core.id(), bytes = self.inbound.len(), "Request head too large");
                    self.inbound.clear();
                    self.fail(ctx, Response::bad_request());
                    return true;
                }
                false
            }
            Err(e) => {
                tracing::debug!(responder = %self.core.id(), error = ?e, "Malformed request");
                self.inbound.clear();
                self.fail(ctx, Response::bad_request());
                true
            }
        }
    }

    fn handle_request(&mut self, ctx: &mut Context<'_>, request: Request) {
        self.keep_alive = request.keep_alive();

        let target = match request.target() {
            Ok(t) => t,
            Err(_) => return self.fail(ctx, Response::bad_request()),
        };

        tracing::debug!(
            responder = %self.core.id(),
            method = ?request.method,
            path = %target.path,
            "Request received"
        );

        let is_upload = request.method == Method::POST && target.path == "/upload";
        if !is_upload && request.content_length().unwrap_or(0) > 0 {
            // The body is not read, so the connection cannot be reused.
            self.keep_alive = false;
        }

        match request.method {
            Method::GET | Method::HEAD => {
                self.file_path = match target.path.as_str() {
                    "/" => "index.html".to_string(),
                    p => p.to_string(),
                };
                self.request = Some(request);
                self.core
                    .set_state(State::Protocol(HttpState::WaitingForResourceLock));
                self.wait_for_lock(ctx);
            }
            Method::POST if is_upload => self.begin_upload(ctx, &request, &target),
            Method::DELETE => self.delete(ctx, &target.path),
            _ => self.respond(ctx, Response::method_not_allowed()),
        }
    }

    // ---- WaitingForResourceLock / FetchingResourceInfo ----

    fn wait_for_lock(&mut self, ctx: &mut Context<'_>) -> bool {
        if ctx.lock.acquire(self.core.id()) {
            self.core
                .set_state(State::Protocol(HttpState::FetchingResourceInfo));
            self.fetch_info(ctx);
            return true;
        }
        self.timed_out(ctx, "resource lock")
    }

    fn fetch_info(&mut self, ctx: &mut Context<'_>) -> bool {
        let info = match ctx.files.poll_file_info(&self.file_path) {
            Poll::Pending => return self.timed_out(ctx, "file info"),
            Poll::Ready(info) => info,
        };
        ctx.lock.release(self.core.id());

        match info {
            Ok(Some(info)) if !info.is_dir => self.serve_file(ctx, info),
            Ok(_) => self.respond(ctx, Response::not_found()),
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %self.file_path, error = %e, "File lookup failed");
                self.respond(ctx, Response::internal_error());
            }
        }
        true
    }

    fn serve_file(&mut self, ctx: &mut Context<'_>, info: FileInfo) {
        let head = ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", mime::content_type(&self.file_path))
            .header("Content-Length", info.size.to_string())
            .build();

        let head_only = self
            .request
            .as_ref()
            .is_some_and(|r| r.method == Method::HEAD);
        if head_only {
            return self.respond(ctx, head);
        }

        match ctx.files.open_read(&self.file_path) {
            Ok(file) => {
                self.core.send_file(file);
                self.respond(ctx, head);
            }
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %self.file_path, error = %e, "Failed to open file");
                self.respond(ctx, Response::internal_error());
            }
        }
    }

    // ---- Uploading ----

    fn begin_upload(&mut self, ctx: &mut Context<'_>, request: &Request, target: &Target) {
        let (Some(name), Some(length)) = (target.param("name"), request.content_length()) else {
            return self.fail(ctx, Response::bad_request());
        };
        let time = target
            .param("time")
            .and_then(|t| t.parse::<u64>().ok())
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

        let file = match ctx.files.open_write(name) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %name, error = %e, "Cannot create upload file");
                return self.fail(ctx, Response::json(StatusCode::InternalServerError, UPLOAD_FAILED));
            }
        };

        self.upload_length = length;
        self.upload_remaining = length;
        self.upload_time = time;
        self.core.start_upload(ctx, file, name, Some(length));
        self.core.arm_timer(ctx.now_ms, self.timeout());
        self.feed_upload(ctx);
    }

    /// Moves buffered body bytes into the upload. Completes the upload once
    /// the whole body has arrived.
    fn feed_upload(&mut self, ctx: &mut Context<'_>) -> bool {
        let n = (self.inbound.len() as u64).min(self.upload_remaining) as usize;
        if n > 0 {
            let chunk = self.inbound.split_to(n);
            self.core.write_upload(&chunk);
            self.upload_remaining -= n as u64;
        }
        if self.upload_remaining == 0 {
            self.complete_upload(ctx);
            return true;
        }
        n > 0
    }

    fn complete_upload(&mut self, ctx: &mut Context<'_>) {
        let committed = self
            .core
            .finish_upload(ctx, self.upload_length, self.upload_time);
        let resp = if committed {
            Response::json(StatusCode::Ok, UPLOAD_OK)
        } else {
            Response::json(StatusCode::InternalServerError, UPLOAD_FAILED)
        };
        self.respond(ctx, resp);
    }

    fn do_uploading(&mut self, ctx: &mut Context<'_>) -> bool {
        let mut progress = self.feed_upload(ctx);

        for _ in 0..UPLOAD_READS_PER_SPIN {
            if self.core.state() != State::Uploading {
                return true;
            }
            match self.core.receive(&mut self.inbound, READ_CHUNK) {
                Received::Data(_) => {
                    progress = true;
                    self.core.arm_timer(ctx.now_ms, self.timeout());
                    self.feed_upload(ctx);
                }
                Received::Idle => break,
                Received::Closed => {
                    self.core.connection_lost(ctx);
                    self.clear_session();
                    return true;
                }
            }
        }

        if !progress && self.core.state() == State::Uploading {
            return self.timed_out(ctx, "upload data");
        }
        progress
    }

    // ---- DELETE ----

    fn delete(&mut self, ctx: &mut Context<'_>, path: &str) {
        let resp = match ctx.files.remove(path) {
            Ok(true) => Response::json(StatusCode::Ok, UPLOAD_OK),
            Ok(false) => Response::not_found(),
            Err(e) => {
                tracing::warn!(responder = %self.core.id(), file = %path, error = %e, "Delete failed");
                Response::internal_error()
            }
        };
        self.respond(ctx, resp);
    }

    fn do_sending(&mut self, ctx: &mut Context<'_>) -> bool {
        if self.core.send_data(ctx) {
            if self.core.state() == State::Sending {
                self.core.arm_timer(ctx.now_ms, self.timeout());
            } else if self.core.is_free() {
                self.clear_session();
            }
            return true;
        }
        self.timed_out(ctx, "client to accept data")
    }
}

impl NetworkResponder for HttpResponder {
    fn id(&self) -> ResponderId {
        self.core.id()
    }

    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn state(&self) -> ResponderState {
        self.core.state().flatten()
    }

    fn spin(&mut self, ctx: &mut Context<'_>) -> bool {
        match self.core.state() {
            State::Free => false,
            State::Reading => self.do_reading(ctx),
            State::Uploading => self.do_uploading(ctx),
            State::Sending => self.do_sending(ctx),
            State::Protocol(HttpState::WaitingForResourceLock) => self.wait_for_lock(ctx),
            State::Protocol(HttpState::FetchingResourceInfo) => self.fetch_info(ctx),
        }
    }

    fn accept(
        &mut self,
        socket: Box<dyn Socket>,
        protocol: Protocol,
        ctx: &mut Context<'_>,
    ) -> Result<(), Box<dyn Socket>> {
        if protocol != Protocol::Http || !self.core.is_free() {
            return Err(socket);
        }
        self.clear_session();
        self.core.bind(socket, State::Reading);
        self.core.arm_timer(ctx.now_ms, self.timeout());
        Ok(())
    }

    fn terminate(&mut self, protocol: Protocol, ctx: &mut Context<'_>) {
        if protocol == Protocol::Http {
            self.abandon_lookup(ctx);
            self.core.terminate(ctx);
            self.clear_session();
        }
    }

    fn connection_lost(&mut self, ctx: &mut Context<'_>) {
        self.abandon_lookup(ctx);
        self.core.connection_lost(ctx);
        self.clear_session();
    }

    fn diagnostics(&self, sink: &mut dyn DiagnosticSink) {
        sink.report(self.core.snapshot());
    }
}

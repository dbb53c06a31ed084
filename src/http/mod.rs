//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 file server with keep-alive, uploads and deletes,
//! written as a resumable responder rather than a task per connection.
//!
//! # Architecture
//!
//! - **`responder`**: the per-connection state machine
//! - **`parser`**: parses request heads from byte buffers
//! - **`request`**: HTTP request representation and target parsing
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes responses into the pending output
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for a request head
//!        └──────┬──────┘
//!               │ GET / HEAD                     POST /upload
//!               ▼                                      ▼
//!        ┌────────────────────────┐            ┌─────────────┐
//!        │ WaitingForResourceLock │            │  Uploading  │
//!        └──────┬─────────────────┘            └──────┬──────┘
//!               ▼                                     │ body complete
//!        ┌────────────────────────┐                   │
//!        │  FetchingResourceInfo  │                   │
//!        └──────┬─────────────────┘                   │
//!               │ response queued ◀───────────────────┘
//!               ├─ Keep-Alive → Reading (via Sending if the socket is full)
//!               └─ Close → Free
//! ```

pub mod mime;
pub mod parser;
pub mod request;
pub mod responder;
pub mod response;
pub mod writer;

pub use responder::{HttpResponder, HttpState};

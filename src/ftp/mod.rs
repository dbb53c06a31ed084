//! FTP protocol implementation.
//!
//! A control connection carries commands and replies; file data moves over
//! a separate passive data connection opened through [`DataPorts`].
//!
//! - **`command`**: control-line parsing
//! - **`responder`**: the per-session state machine
//!
//! # Session State Machine
//!
//! ```text
//!   Reading ── PASV ──▶ WaitingForDataPort ── connection ──▶ DataPortOpened
//!      ▲                        │ timeout (425)                 │
//!      │◀───────────────────────┘                 RETR / LIST   │   STOR
//!      │                                    ┌───────────────────┴────────┐
//!      │                                    ▼                            ▼
//!      │                           SendingDataChannel               Uploading
//!      │                                    ▼                            │
//!      │                          DataTransferComplete                   │
//!      └──────────────── 226 / 426 ─────────┘◀────────── 226 / 550 ──────┘
//! ```
//!
//! [`DataPorts`]: crate::net::DataPorts

pub mod command;
pub mod responder;

pub use command::Command;
pub use responder::{FtpResponder, FtpState};

//! Switchboard - cooperative network responders
//!
//! Core library: the responder state machine and resource lock, plus
//! minimal HTTP, FTP and Telnet responders built on it.

pub mod config;
pub mod ftp;
pub mod http;
pub mod net;
pub mod responder;
pub mod server;
pub mod storage;
pub mod telnet;

//! Telnet line sessions.
//!
//! A connection gets a banner, an optional password prompt, and then a
//! prompt per line. Each line goes to the stack's command handler and the
//! handler's reply is echoed back. `quit` or `exit` ends the session.

pub mod iac;
pub mod responder;

pub use responder::{TelnetResponder, TelnetState};

use crate::net::DataPorts;
use crate::responder::{ResourceLock, ResponderId};
use crate::storage::FileSystem;

/// Everything a responder may touch outside itself during one call.
///
/// Built fresh by the scheduler for every pass instead of being reached
/// through process-wide singletons.
pub struct Context<'a> {
    /// Milliseconds since the stack started.
    pub now_ms: u64,
    pub lock: &'a mut ResourceLock,
    pub files: &'a mut dyn FileSystem,
    pub ports: &'a mut dyn DataPorts,
    pub commands: &'a mut dyn CommandHandler,
}

/// Consumer of command lines typed into a line session.
pub trait CommandHandler {
    /// Returns the reply to send back, if any.
    fn handle_line(&mut self, from: ResponderId, line: &str) -> Option<String>;
}

/// Logs each command and acknowledges it.
#[derive(Debug, Default)]
pub struct LoggingCommands;

impl CommandHandler for LoggingCommands {
    fn handle_line(&mut self, from: ResponderId, line: &str) -> Option<String> {
        tracing::info!(responder = %from, command = %line, "Session command");
        Some("ok".to_string())
    }
}

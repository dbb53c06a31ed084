use serde::Serialize;

use crate::responder::lock::ResponderId;
use crate::responder::state::{Protocol, ResponderState};
use crate::responder::upload::UploadSnapshot;

/// Point-in-time view of one responder.
#[derive(Debug, Clone, Serialize)]
pub struct ResponderSnapshot {
    pub id: ResponderId,
    pub protocol: Protocol,
    pub state: ResponderState,
    /// Where a responder in `Sending` goes once its output is out.
    pub resume_state: Option<ResponderState>,
    pub remote: Option<String>,
    pub pending_output: usize,
    pub upload: Option<UploadSnapshot>,
    pub connections: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Destination for diagnostic reports.
pub trait DiagnosticSink {
    fn report(&mut self, snapshot: ResponderSnapshot);
}

impl DiagnosticSink for Vec<ResponderSnapshot> {
    fn report(&mut self, snapshot: ResponderSnapshot) {
        self.push(snapshot);
    }
}

/// Logs each report on a named channel.
pub struct TracingSink {
    pub channel: &'static str,
}

impl DiagnosticSink for TracingSink {
    fn report(&mut self, s: ResponderSnapshot) {
        tracing::info!(
            channel = self.channel,
            responder = %s.id,
            protocol = %s.protocol,
            state = ?s.state,
            remote = s.remote.as_deref().unwrap_or("-"),
            pending = s.pending_output,
            connections = s.connections,
            sent = s.bytes_sent,
            received = s.bytes_received,
            "Responder status"
        );
    }
}

/// Collects reports as a YAML sequence.
#[derive(Default)]
pub struct YamlSink {
    snapshots: Vec<ResponderSnapshot>,
}

impl YamlSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(&self.snapshots)?)
    }
}

impl DiagnosticSink for YamlSink {
    fn report(&mut self, snapshot: ResponderSnapshot) {
        self.snapshots.push(snapshot);
    }
}

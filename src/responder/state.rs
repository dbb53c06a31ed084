use serde::{Deserialize, Serialize};
use std::fmt;

/// Which protocol family a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Ftp,
    Telnet,
}

impl Protocol {
    /// Maps a listen URL scheme (`http`, `ftp`, `telnet`) to a protocol.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Protocol::Http),
            "ftp" => Some(Protocol::Ftp),
            "telnet" => Some(Protocol::Telnet),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Ftp => "ftp",
            Protocol::Telnet => "telnet",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every state any responder can be in.
///
/// This is the flat view used for reporting. Responders themselves work with
/// [`State`], which keeps the protocol-specific states apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponderState {
    Free,
    Reading,
    Sending,
    Uploading,

    // request/response
    WaitingForResourceLock,
    FetchingResourceInfo,

    // command + data channel
    WaitingForDataPort,
    DataPortOpened,
    SendingDataChannel,
    DataTransferComplete,

    // line session
    JustConnected,
    Authenticating,
}

/// Protocol-specific extension states.
pub trait ExtensionState: Copy + PartialEq + fmt::Debug {
    fn flatten(self) -> ResponderState;
}

/// The state of one responder: the four common states plus the
/// extension states of its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State<X> {
    Free,
    Reading,
    Sending,
    Uploading,
    Protocol(X),
}

impl<X: ExtensionState> State<X> {
    pub fn flatten(self) -> ResponderState {
        match self {
            State::Free => ResponderState::Free,
            State::Reading => ResponderState::Reading,
            State::Sending => ResponderState::Sending,
            State::Uploading => ResponderState::Uploading,
            State::Protocol(x) => x.flatten(),
        }
    }
}

/// Responders without extension states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoExtension {}

impl ExtensionState for NoExtension {
    fn flatten(self) -> ResponderState {
        match self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_lookup() {
        assert_eq!(Protocol::from_scheme("ftp"), Some(Protocol::Ftp));
        assert_eq!(Protocol::from_scheme("https"), None);
    }

    #[test]
    fn common_states_flatten() {
        let s: State<NoExtension> = State::Uploading;
        assert_eq!(s.flatten(), ResponderState::Uploading);
    }
}

//! Telnet command stripping.
//!
//! Clients interleave option negotiation with typed text. Nothing is
//! negotiated here; the filter drops every command sequence and passes
//! plain data through, keeping its place across reads.

use bytes::BytesMut;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Data,
    Command,
    OptionByte,
    Subnegotiation,
    SubnegotiationIac,
}

#[derive(Debug, Default)]
pub struct IacFilter {
    phase: Phase,
}

impl IacFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Data;
    }

    /// Appends the data bytes of `input` to `out`.
    pub fn filter(&mut self, input: &[u8], out: &mut BytesMut) {
        for &byte in input {
            self.phase = match (self.phase, byte) {
                (Phase::Data, IAC) => Phase::Command,
                // NUL pads a bare carriage return.
                (Phase::Data, 0) => Phase::Data,
                (Phase::Data, b) => {
                    out.extend_from_slice(&[b]);
                    Phase::Data
                }
                (Phase::Command, IAC) => {
                    out.extend_from_slice(&[IAC]);
                    Phase::Data
                }
                (Phase::Command, SB) => Phase::Subnegotiation,
                (Phase::Command, WILL..=DONT) => Phase::OptionByte,
                (Phase::Command, _) => Phase::Data,
                (Phase::OptionByte, _) => Phase::Data,
                (Phase::Subnegotiation, IAC) => Phase::SubnegotiationIac,
                (Phase::Subnegotiation, _) => Phase::Subnegotiation,
                (Phase::SubnegotiationIac, SE) => Phase::Data,
                (Phase::SubnegotiationIac, _) => Phase::Subnegotiation,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &mut IacFilter, input: &[u8]) -> Vec<u8> {
        let mut out = BytesMut::new();
        filter.filter(input, &mut out);
        out.to_vec()
    }

    #[test]
    fn negotiation_is_dropped() {
        let mut f = IacFilter::new();
        let input = [IAC, 253, 1, b'h', b'i', IAC, 251, 3, b'\r', b'\n'];
        assert_eq!(run(&mut f, &input), b"hi\r\n");
    }

    #[test]
    fn escaped_iac_is_data() {
        let mut f = IacFilter::new();
        assert_eq!(run(&mut f, &[b'a', IAC, IAC, b'b']), [b'a', IAC, b'b']);
    }

    #[test]
    fn sequences_split_across_reads() {
        let mut f = IacFilter::new();
        assert_eq!(run(&mut f, &[b'x', IAC]), b"x");
        assert_eq!(run(&mut f, &[SB, 24, 1, IAC]), b"");
        assert_eq!(run(&mut f, &[SE, b'y', b'\r', 0]), b"y\r");
    }
}

use std::fmt::Write as _;

use crate::http::response::Response;
use crate::responder::output::OutputBuffer;

/// Appends the status line and headers of `resp` to `out`, up to and
/// including the blank line. The body is queued separately.
///
/// Headers go out in name order so the bytes are stable.
pub fn write_head(resp: &Response, out: &mut OutputBuffer) {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    let mut headers: Vec<_> = resp.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        let _ = write!(head, "{name}: {value}\r\n");
    }
    head.push_str("\r\n");
    out.push_str(&head);
}

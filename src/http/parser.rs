use std::collections::HashMap;
use std::fmt;

use crate::http::request::{Method, Request};

const HEAD_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The blank line ending the head has not arrived yet.
    Incomplete,
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            ParseError::Incomplete => "incomplete request head",
            ParseError::InvalidRequest => "malformed request line",
            ParseError::InvalidMethod => "unknown method",
            ParseError::InvalidHeader => "malformed header",
            ParseError::InvalidContentLength => "bad Content-Length",
        };
        f.write_str(what)
    }
}

impl std::error::Error for ParseError {}

/// Parses a request head (request line and headers).
///
/// Returns the request and the number of bytes consumed, up to and including
/// the blank line. Any body bytes are left in `buf` for the caller.
pub fn parse_request_head(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let end = buf
        .windows(HEAD_END.len())
        .position(|w| w == HEAD_END)
        .ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..end]).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = head.split("\r\n");
    let (method, path, version) = request_line(lines.next().unwrap_or_default())?;

    let mut headers = HashMap::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = header_line(line)?;
        headers.insert(name.to_string(), value.to_string());
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
    };
    if request
        .header("Content-Length")
        .is_some_and(|v| v.parse::<u64>().is_err())
    {
        return Err(ParseError::InvalidContentLength);
    }

    Ok((request, end + HEAD_END.len()))
}

fn request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequest);
    };
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }
    let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;
    Ok((method, path, version))
}

fn header_line(line: &str) -> Result<(&str, &str), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ParseError::InvalidHeader);
    }
    Ok((name, value.trim()))
}

use anyhow::Context as _;
use std::collections::HashMap;

/// Request methods the parser recognizes.
///
/// Only GET, HEAD, POST and DELETE are served; the rest are answered with
/// 405.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    PATCH,
}

impl Method {
    /// Matches a method token. Tokens are case-sensitive.
    ///
    /// ```
    /// # use switchboard::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            _ => return None,
        })
    }
}

/// A parsed request head.
///
/// The body is never buffered here; the responder streams it straight into
/// its destination.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request target, query included.
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

/// Request target split into a file path and decoded query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Target {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Request {
    /// Header value by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.headers.get(name) {
            return Some(v.as_str());
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `None` when the header is missing or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length")?.parse().ok()
    }

    /// HTTP/1.1 keeps the connection by default and HTTP/1.0 does not. An
    /// explicit `Connection` header overrides either.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) => v.eq_ignore_ascii_case("keep-alive"),
            None => self.version != "HTTP/1.0",
        }
    }

    /// Splits the request target into a decoded path and decoded query
    /// pairs. Fails when the path does not decode to UTF-8.
    pub fn target(&self) -> anyhow::Result<Target> {
        let url = url::Url::parse("http://localhost/")?.join(&self.path)?;
        let path = percent_encoding::percent_decode_str(url.path())
            .decode_utf8()
            .context("Request path is not UTF-8")?;
        Ok(Target {
            path: path.into_owned(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        })
    }
}

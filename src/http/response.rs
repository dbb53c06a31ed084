use std::collections::HashMap;

/// Status codes the file responder sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl StatusCode {
    fn parts(self) -> (u16, &'static str) {
        match self {
            StatusCode::Ok => (200, "OK"),
            StatusCode::BadRequest => (400, "Bad Request"),
            StatusCode::NotFound => (404, "Not Found"),
            StatusCode::MethodNotAllowed => (405, "Method Not Allowed"),
            StatusCode::InternalServerError => (500, "Internal Server Error"),
        }
    }

    /// ```
    /// # use switchboard::http::response::StatusCode;
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.parts().0
    }

    pub fn reason_phrase(&self) -> &'static str {
        self.parts().1
    }
}

/// A response head plus an in-memory body.
///
/// File contents are never part of `body`: they are streamed after the
/// head, which then carries the file's `Content-Length` itself.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Fills in `Content-Length` from the body unless one was set.
    pub fn build(self) -> Response {
        let Self {
            status,
            mut headers,
            body,
        } = self;
        headers
            .entry("Content-Length".to_string())
            .or_insert_with(|| body.len().to_string());
        Response {
            status,
            headers,
            body,
        }
    }
}

impl Response {
    /// Plain-text response whose body repeats the status line.
    fn status_page(status: StatusCode) -> ResponseBuilder {
        let text = format!("{} {}", status.as_u16(), status.reason_phrase());
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(text)
    }

    pub fn json(status: StatusCode, body: &str) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "application/json")
            .body(body)
            .build()
    }

    pub fn bad_request() -> Self {
        Self::status_page(StatusCode::BadRequest).build()
    }

    pub fn not_found() -> Self {
        Self::status_page(StatusCode::NotFound).build()
    }

    pub fn method_not_allowed() -> Self {
        Self::status_page(StatusCode::MethodNotAllowed)
            .header("Allow", "GET, HEAD, POST, DELETE")
            .build()
    }

    pub fn internal_error() -> Self {
        Self::status_page(StatusCode::InternalServerError).build()
    }

    /// Marks the response as the last one on its connection.
    pub fn closing(mut self) -> Self {
        self.headers
            .insert("Connection".to_string(), "close".to_string());
        self
    }
}

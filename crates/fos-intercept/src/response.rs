//! Canonical response
//!
//! What a request handler supplies when it mocks a request. The body is
//! either complete up front or a stream of chunks delivered one at a time.

use crate::headers::Headers;
use bytes::Bytes;
use serde::Serialize;
use smol::stream::{self, Stream};
use std::fmt;
use std::io;

/// Stream of body chunks
pub type ChunkStream = stream::BoxedLocal<io::Result<Bytes>>;

/// Response body producer
pub enum ResponseBody {
    /// Entire body available at once
    Full(Bytes),
    /// Body arriving in chunks
    Stream(ChunkStream),
}

impl ResponseBody {
    /// Turn the body into a chunk stream
    pub fn into_stream(self) -> ChunkStream {
        match self {
            ResponseBody::Full(bytes) => Box::pin(stream::once(Ok(bytes))),
            ResponseBody::Stream(chunks) => chunks,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Mocked response
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl Response {
    /// Create an empty response with the standard reason phrase
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// 200 response with a plain text body
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(200)
            .with_header("Content-Type", "text/plain;charset=UTF-8")
            .with_header("Content-Length", &body.len().to_string())
            .with_body(body)
    }

    /// 200 response with a JSON body
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(200)
            .with_header("Content-Type", "application/json")
            .with_header("Content-Length", &body.len().to_string())
            .with_body(body))
    }

    /// Network-level failure carrying no status (`status == 0`)
    pub fn network_error() -> Self {
        Self::new(0)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self.status_text = reason_phrase(status).to_string();
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(ResponseBody::Full(body.into()));
        self
    }

    /// Deliver the body from a chunk stream
    pub fn with_stream<S>(mut self, chunks: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + 'static,
    {
        self.body = Some(ResponseBody::Stream(Box::pin(chunks)));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub(crate) fn into_parts(self) -> (u16, String, Headers, Option<ResponseBody>) {
        (self.status, self.status_text, self.headers, self.body)
    }
}

/// Standard reason phrase for a status code
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

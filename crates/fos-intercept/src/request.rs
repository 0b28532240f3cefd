//! Canonical request
//!
//! `RequestNormalizer` accumulates what a caller writes into the handle
//! (method, URL, headers, credentials flag) and builds one immutable
//! `Request` when the body is sent.

use crate::body::Body;
use crate::correlation::RequestId;
use crate::error::{Result, XhrError};
use crate::headers::Headers;
use bytes::Bytes;
use std::rc::Rc;
use url::Url;

/// Request credentials mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

impl Credentials {
    /// Map the `withCredentials` flag
    pub fn from_with_credentials(with_credentials: bool) -> Self {
        if with_credentials {
            Credentials::Include
        } else {
            Credentials::SameOrigin
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Credentials::Omit => "omit",
            Credentials::SameOrigin => "same-origin",
            Credentials::Include => "include",
        }
    }
}

/// Immutable request handed to the request handler
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    url: Url,
    headers: Headers,
    body: Option<Rc<Body>>,
    credentials: Credentials,
    id: RequestId,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Shortcut for a single header value
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_deref()
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

/// Normalize a method token.
///
/// Standard methods are matched case-insensitively and uppercased; any
/// other token is kept as written.
pub fn normalize_method(method: &str) -> String {
    const STANDARD: [&str; 7] = ["DELETE", "GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH"];
    STANDARD
        .iter()
        .find(|m| m.eq_ignore_ascii_case(method))
        .map(|m| m.to_string())
        .unwrap_or_else(|| method.to_string())
}

/// Accumulates request composition until send-time
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    base_url: Url,
    method: String,
    url: Option<Url>,
    headers: Headers,
    with_credentials: bool,
    id: Option<RequestId>,
}

impl RequestNormalizer {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            method: "GET".to_string(),
            url: None,
            headers: Headers::new(),
            with_credentials: false,
            id: None,
        }
    }

    /// Start a new logical request. Previously captured headers are dropped.
    pub fn open(&mut self, method: &str, url: &str, id: RequestId) -> Result<()> {
        let resolved = self.base_url.join(url)?;
        self.method = normalize_method(method);
        self.url = Some(resolved);
        self.headers = Headers::new();
        self.id = Some(id);
        Ok(())
    }

    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    pub fn set_with_credentials(&mut self, include: bool) {
        self.with_credentials = include;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Build the canonical request
    pub fn finish(&self, body: Option<Bytes>) -> Result<Request> {
        let (Some(url), Some(id)) = (self.url.clone(), self.id.clone()) else {
            return Err(XhrError::InvalidState("request has not been opened"));
        };

        Ok(Request {
            method: self.method.clone(),
            url,
            headers: self.headers.clone(),
            body: body.map(|b| Rc::new(Body::new(b))),
            credentials: Credentials::from_with_credentials(self.with_credentials),
            id,
        })
    }
}

//! Transport capability interface
//!
//! The surface of an XMLHttpRequest-style handle that the interception
//! controller depends on. `XmlHttpRequest` is the native implementation,
//! `testing::RecordingTransport` an in-memory double, and the controller
//! implements the trait itself so controllers can be stacked.

use crate::error::Result;
use crate::events::{EventKind, Listener, ListenerId};
use crate::value::ResponseValue;
use bytes::Bytes;

/// XHR ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ReadyState {
    /// Client has been created, open() not called yet
    #[default]
    Unsent = 0,
    /// open() has been called
    Opened = 1,
    /// Response status and headers are available
    HeadersReceived = 2,
    /// Downloading, responseText holds partial data
    Loading = 3,
    /// Operation complete
    Done = 4,
}

impl ReadyState {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// XHR response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// `""`: text, with `responseXML` also available
    #[default]
    Default,
    Text,
    ArrayBuffer,
    Blob,
    Document,
    Json,
}

impl ResponseType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "text" => ResponseType::Text,
            "arraybuffer" => ResponseType::ArrayBuffer,
            "blob" => ResponseType::Blob,
            "document" => ResponseType::Document,
            "json" => ResponseType::Json,
            _ => ResponseType::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Default => "",
            ResponseType::Text => "text",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Blob => "blob",
            ResponseType::Document => "document",
            ResponseType::Json => "json",
        }
    }

    /// May `responseText` be read?
    pub fn allows_text(&self) -> bool {
        matches!(self, ResponseType::Default | ResponseType::Text)
    }

    /// May `responseXML` be read?
    pub fn allows_document(&self) -> bool {
        matches!(self, ResponseType::Default | ResponseType::Document)
    }
}

/// Body passed to `send()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XhrBody {
    Text(String),
    Bytes(Bytes),
}

impl XhrBody {
    /// Materialize as bytes: text is UTF-8 encoded, binary passes through
    pub fn to_bytes(&self) -> Bytes {
        match self {
            XhrBody::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            XhrBody::Bytes(bytes) => bytes.clone(),
        }
    }
}

impl From<&str> for XhrBody {
    fn from(text: &str) -> Self {
        XhrBody::Text(text.to_string())
    }
}

impl From<String> for XhrBody {
    fn from(text: String) -> Self {
        XhrBody::Text(text)
    }
}

impl From<Vec<u8>> for XhrBody {
    fn from(bytes: Vec<u8>) -> Self {
        XhrBody::Bytes(bytes.into())
    }
}

impl From<Bytes> for XhrBody {
    fn from(bytes: Bytes) -> Self {
        XhrBody::Bytes(bytes)
    }
}

/// Capability set of a request-issuing handle
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Initialize a request
    fn open(&self, method: &str, url: &str) -> Result<()>;

    /// Append a request header
    fn set_request_header(&self, name: &str, value: &str) -> Result<()>;

    /// Set `withCredentials`
    fn set_with_credentials(&self, include: bool) -> Result<()>;

    fn with_credentials(&self) -> bool;

    /// Declare how the response should be represented
    fn set_response_type(&self, response_type: ResponseType) -> Result<()>;

    fn response_type(&self) -> ResponseType;

    /// Override the response MIME type
    fn override_mime_type(&self, mime: &str) -> Result<()>;

    /// Subscribe to an event
    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Unsubscribe from an event
    fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool;

    /// Assign (or clear) the `onX` handler for an event
    fn set_event_handler(&self, kind: EventKind, handler: Option<Listener>);

    /// Send the request and drive it to completion
    async fn send(&self, body: Option<XhrBody>) -> Result<()>;

    /// Cancel the request
    fn abort(&self);

    fn ready_state(&self) -> ReadyState;

    fn status(&self) -> u16;

    fn status_text(&self) -> String;

    /// Read one response header
    fn response_header(&self, name: &str) -> Option<String>;

    /// All response headers, serialized
    fn all_response_headers(&self) -> String;

    /// `responseText`
    fn response_text(&self) -> Result<String>;

    /// `response`, shaped by the declared response type
    fn response(&self) -> Result<Option<ResponseValue>>;

    /// `responseXML`
    fn response_xml(&self) -> Result<Option<crate::document::Document>>;

    /// Write the ready state directly, without firing any event.
    ///
    /// Used while emulating a mocked exchange. Hosts that refuse to
    /// redefine `readyState` through their generic property path still
    /// accept this direct write.
    fn overwrite_ready_state(&self, state: ReadyState);

    /// Write status and status text directly
    fn overwrite_status(&self, status: u16, status_text: &str);
}

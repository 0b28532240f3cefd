//! In-memory transport for tests
//!
//! `RecordingTransport` is a native `XmlHttpRequest` whose backend serves a
//! canned reply, with every call made on it written to a log. Wrap it in a
//! controller to observe exactly what reaches the underlying handle.

use crate::document::Document;
use crate::error::Result;
use crate::events::{EventKind, Listener, ListenerId};
use crate::headers::Headers;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{ReadyState, ResponseType, Transport, XhrBody};
use crate::value::ResponseValue;
use crate::xhr::XmlHttpRequest;
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A call made on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Open { method: String, url: String },
    SetRequestHeader { name: String, value: String },
    SetWithCredentials(bool),
    SetResponseType(ResponseType),
    OverrideMimeType(String),
    AddEventListener(EventKind),
    RemoveEventListener(EventKind),
    SetEventHandler { kind: EventKind, present: bool },
    Send(Option<Bytes>),
    Abort,
    OverwriteReadyState(ReadyState),
    OverwriteStatus { status: u16, status_text: String },
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    headers: Headers,
    body: Bytes,
}

/// Recording transport with a canned network reply
pub struct RecordingTransport {
    inner: XmlHttpRequest,
    calls: RefCell<Vec<TransportCall>>,
    reply: Rc<RefCell<Reply>>,
    fetched: Rc<RefCell<Vec<Request>>>,
    offline: Rc<Cell<bool>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    /// A transport whose network answers `200` with an empty body
    pub fn new() -> Self {
        let reply = Rc::new(RefCell::new(Reply {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
        }));
        let fetched = Rc::new(RefCell::new(Vec::new()));
        let offline = Rc::new(Cell::new(false));

        let backend = {
            let reply = reply.clone();
            let fetched = fetched.clone();
            let offline = offline.clone();
            move |request: Request| {
                let reply = reply.borrow().clone();
                let offline = offline.get();
                fetched.borrow_mut().push(request);
                async move {
                    if offline {
                        return Err(crate::error::XhrError::Network("offline".to_string()));
                    }
                    Ok(Response::new(reply.status)
                        .with_headers(reply.headers)
                        .with_body(reply.body))
                }
            }
        };

        Self {
            inner: XmlHttpRequest::with_backend(backend),
            calls: RefCell::new(Vec::new()),
            reply,
            fetched,
            offline,
        }
    }

    /// Set what the network answers
    pub fn with_reply(self, status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type);
        headers.set("Content-Length", &body.len().to_string());
        *self.reply.borrow_mut() = Reply { status, headers, body };
        self
    }

    /// Make every network fetch fail
    pub fn offline(self) -> Self {
        self.offline.set(true);
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.borrow().clone()
    }

    /// Number of `send()` calls that reached this transport
    pub fn send_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, TransportCall::Send(_)))
            .count()
    }

    /// Requests that went out to the network
    pub fn fetched(&self) -> Vec<Request> {
        self.fetched.borrow().clone()
    }

    /// Request headers accepted by the handle
    pub fn request_headers(&self) -> Headers {
        self.inner.request_headers()
    }

    fn record(&self, call: TransportCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Transport for RecordingTransport {
    fn open(&self, method: &str, url: &str) -> Result<()> {
        self.record(TransportCall::Open {
            method: method.to_string(),
            url: url.to_string(),
        });
        self.inner.open(method, url)
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<()> {
        self.record(TransportCall::SetRequestHeader {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.inner.set_request_header(name, value)
    }

    fn set_with_credentials(&self, include: bool) -> Result<()> {
        self.record(TransportCall::SetWithCredentials(include));
        self.inner.set_with_credentials(include)
    }

    fn with_credentials(&self) -> bool {
        self.inner.with_credentials()
    }

    fn set_response_type(&self, response_type: ResponseType) -> Result<()> {
        self.record(TransportCall::SetResponseType(response_type));
        self.inner.set_response_type(response_type)
    }

    fn response_type(&self) -> ResponseType {
        self.inner.response_type()
    }

    fn override_mime_type(&self, mime: &str) -> Result<()> {
        self.record(TransportCall::OverrideMimeType(mime.to_string()));
        self.inner.override_mime_type(mime)
    }

    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.record(TransportCall::AddEventListener(kind));
        self.inner.add_event_listener(kind, listener)
    }

    fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.record(TransportCall::RemoveEventListener(kind));
        self.inner.remove_event_listener(kind, id)
    }

    fn set_event_handler(&self, kind: EventKind, handler: Option<Listener>) {
        self.record(TransportCall::SetEventHandler {
            kind,
            present: handler.is_some(),
        });
        self.inner.set_event_handler(kind, handler);
    }

    async fn send(&self, body: Option<XhrBody>) -> Result<()> {
        self.record(TransportCall::Send(body.as_ref().map(XhrBody::to_bytes)));
        self.inner.send(body).await
    }

    fn abort(&self) {
        self.record(TransportCall::Abort);
        self.inner.abort();
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn status_text(&self) -> String {
        self.inner.status_text()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.inner.response_header(name)
    }

    fn all_response_headers(&self) -> String {
        self.inner.all_response_headers()
    }

    fn response_text(&self) -> Result<String> {
        self.inner.response_text()
    }

    fn response(&self) -> Result<Option<ResponseValue>> {
        self.inner.response()
    }

    fn response_xml(&self) -> Result<Option<Document>> {
        self.inner.response_xml()
    }

    fn overwrite_ready_state(&self, state: ReadyState) {
        self.record(TransportCall::OverwriteReadyState(state));
        self.inner.overwrite_ready_state(state);
    }

    fn overwrite_status(&self, status: u16, status_text: &str) {
        self.record(TransportCall::OverwriteStatus {
            status,
            status_text: status_text.to_string(),
        });
        self.inner.overwrite_status(status, status_text);
    }
}

impl std::fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingTransport")
            .field("inner", &self.inner)
            .field("calls", &self.calls.borrow().len())
            .finish_non_exhaustive()
    }
}

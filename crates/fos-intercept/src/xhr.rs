//! XMLHttpRequest
//!
//! The native request handle. It runs the genuine XHR lifecycle, fetching
//! through a pluggable `NetworkBackend`, and exposes the direct-write hooks
//! the interception controller needs to replay mocked exchanges onto it.

use crate::correlation::IdGenerator;
use crate::document::{Document, DocumentParser};
use crate::error::{Result, XhrError};
use crate::events::{Event, EventKind, EventRegistry, Listener, ListenerId, dispatch};
use crate::headers::{Headers, mime_essence};
use crate::request::{Request, RequestNormalizer};
use crate::response::Response;
use crate::transport::{ReadyState, ResponseType, Transport, XhrBody};
use crate::value::{self, ResponseValue};
use smol::stream::StreamExt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use url::Url;

/// Eventual backend result
pub type BackendFuture = Pin<Box<dyn Future<Output = Result<Response>>>>;

/// Performs the real exchange for a request nobody mocked
pub trait NetworkBackend {
    fn fetch(&self, request: Request) -> BackendFuture;
}

impl<F, Fut> NetworkBackend for F
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Result<Response>> + 'static,
{
    fn fetch(&self, request: Request) -> BackendFuture {
        Box::pin(self(request))
    }
}

/// Backend for hosts without network access
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl NetworkBackend for UnavailableBackend {
    fn fetch(&self, request: Request) -> BackendFuture {
        let url = request.url().clone();
        Box::pin(async move {
            Err(XhrError::Network(format!("network access is unavailable ({})", url)))
        })
    }
}

/// Backend performing real HTTP requests with reqwest.
///
/// reqwest futures need a tokio reactor; drive the handle from inside one.
#[cfg(feature = "reqwest")]
#[derive(Debug, Default, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest")]
impl NetworkBackend for ReqwestBackend {
    fn fetch(&self, request: Request) -> BackendFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let network = |e: reqwest::Error| XhrError::Network(e.to_string());

            let method = reqwest::Method::from_bytes(request.method().as_bytes())
                .map_err(|e| XhrError::Network(e.to_string()))?;
            let mut builder = client.request(method, request.url().clone());
            for (name, value) in request.headers().iter() {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body() {
                let bytes = body.bytes().map_err(|e| XhrError::Network(e.to_string()))?;
                builder = builder.body(bytes);
            }

            let response = builder.send().await.map_err(network)?;
            let status = response.status();
            let mut headers = Headers::new();
            for (name, value) in response.headers() {
                if let Ok(v) = value.to_str() {
                    headers.append(name.as_str(), v);
                }
            }
            let body = response.bytes().await.map_err(network)?;

            Ok(Response::new(status.as_u16())
                .with_status_text(status.canonical_reason().unwrap_or(""))
                .with_headers(headers)
                .with_body(body))
        })
    }
}

/// Check if header is forbidden
fn is_forbidden_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(lower.as_str(),
        "accept-charset" | "accept-encoding" | "access-control-request-headers" |
        "access-control-request-method" | "connection" | "content-length" |
        "cookie" | "cookie2" | "date" | "dnt" | "expect" | "host" |
        "keep-alive" | "origin" | "referer" | "te" | "trailer" |
        "transfer-encoding" | "upgrade" | "via"
    ) || lower.starts_with("proxy-") || lower.starts_with("sec-")
}

#[derive(Debug)]
struct XhrState {
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    request: RequestNormalizer,
    response_headers: Headers,
    response_bytes: Vec<u8>,
    response_type: ResponseType,
    mime_override: Option<String>,
    with_credentials: bool,
    send_flag: bool,
    error_flag: bool,
    /// Bumped by open() and abort() to orphan an in-flight send
    generation: u64,
}

/// XMLHttpRequest object
pub struct XmlHttpRequest {
    state: RefCell<XhrState>,
    registry: RefCell<EventRegistry>,
    backend: Rc<dyn NetworkBackend>,
    parser: Option<Rc<dyn DocumentParser>>,
    ids: IdGenerator,
}

impl Default for XmlHttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlHttpRequest {
    /// Create a request handle without network access
    pub fn new() -> Self {
        Self::with_backend(UnavailableBackend)
    }

    /// Create a request handle fetching through `backend`
    pub fn with_backend(backend: impl NetworkBackend + 'static) -> Self {
        let base_url = Url::parse("http://localhost/").expect("static URL is valid");
        Self {
            state: RefCell::new(XhrState {
                ready_state: ReadyState::Unsent,
                status: 0,
                status_text: String::new(),
                request: RequestNormalizer::new(base_url),
                response_headers: Headers::new(),
                response_bytes: Vec::new(),
                response_type: ResponseType::Default,
                mime_override: None,
                with_credentials: false,
                send_flag: false,
                error_flag: false,
                generation: 0,
            }),
            registry: RefCell::new(EventRegistry::new()),
            backend: Rc::new(backend),
            parser: crate::controller::default_parser(),
            ids: IdGenerator::sequential(),
        }
    }

    /// Resolve relative URLs against `base_url`
    pub fn with_base_url(self, base_url: Url) -> Self {
        self.state.borrow_mut().request = RequestNormalizer::new(base_url);
        self
    }

    /// Replace the document parsing capability
    pub fn with_document_parser(mut self, parser: Option<Rc<dyn DocumentParser>>) -> Self {
        self.parser = parser;
        self
    }

    /// Request headers written so far
    pub fn request_headers(&self) -> Headers {
        self.state.borrow().request.headers().clone()
    }

    fn fire(&self, kind: EventKind, loaded: u64, total: Option<u64>) {
        let ready_state = self.state.borrow().ready_state;
        let listeners = self.registry.borrow().snapshot(kind);
        dispatch(&listeners, &Event::progress(kind, ready_state, loaded, total));
    }

    fn change_state(&self, next: ReadyState) {
        self.state.borrow_mut().ready_state = next;
        self.fire(EventKind::ReadyStateChange, 0, None);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.borrow().generation == generation
    }

    fn mime(&self) -> Option<String> {
        let state = self.state.borrow();
        match &state.mime_override {
            Some(mime) => Some(mime_essence(mime)),
            None => state.response_headers.mime_essence(),
        }
    }

    fn fail(&self, error: XhrError) {
        tracing::debug!("XHR network failure: {}", error);
        {
            let mut state = self.state.borrow_mut();
            state.error_flag = true;
            state.send_flag = false;
            state.status = 0;
            state.status_text.clear();
            state.response_headers = Headers::new();
            state.response_bytes.clear();
        }
        self.change_state(ReadyState::Done);
        self.fire(EventKind::Error, 0, None);
        self.fire(EventKind::LoadEnd, 0, None);
    }

    async fn receive(&self, response: Response, generation: u64) {
        let (status, status_text, headers, body) = response.into_parts();
        let total = headers.content_length();
        {
            let mut state = self.state.borrow_mut();
            state.status = status;
            state.status_text = status_text;
            state.response_headers = headers;
        }
        self.change_state(ReadyState::HeadersReceived);
        self.change_state(ReadyState::Loading);

        if let Some(body) = body {
            let mut chunks = body.into_stream();
            while let Some(chunk) = chunks.next().await {
                if !self.is_current(generation) {
                    return;
                }
                match chunk {
                    Ok(chunk) => {
                        let loaded = {
                            let mut state = self.state.borrow_mut();
                            state.response_bytes.extend_from_slice(&chunk);
                            state.response_bytes.len() as u64
                        };
                        self.fire(EventKind::Progress, loaded, total);
                    }
                    Err(e) => {
                        self.fail(XhrError::Network(e.to_string()));
                        return;
                    }
                }
            }
        }

        if !self.is_current(generation) {
            return;
        }
        let loaded = {
            let mut state = self.state.borrow_mut();
            state.send_flag = false;
            state.response_bytes.len() as u64
        };
        self.change_state(ReadyState::Done);
        self.fire(EventKind::Load, loaded, total);
        self.fire(EventKind::LoadEnd, loaded, total);
    }
}

impl Transport for XmlHttpRequest {
    fn open(&self, method: &str, url: &str) -> Result<()> {
        let id = self.ids.next_id();
        {
            let mut state = self.state.borrow_mut();
            state.request.open(method, url, id)?;
            state.generation += 1;
            state.status = 0;
            state.status_text.clear();
            state.response_headers = Headers::new();
            state.response_bytes.clear();
            state.send_flag = false;
            state.error_flag = false;
        }
        self.change_state(ReadyState::Opened);
        Ok(())
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.ready_state != ReadyState::Opened || state.send_flag {
            return Err(XhrError::InvalidState("setRequestHeader() requires an opened, unsent request"));
        }
        if is_forbidden_header(name) {
            return Err(XhrError::ForbiddenHeader(name.to_string()));
        }
        state.request.append_header(name, value);
        Ok(())
    }

    fn set_with_credentials(&self, include: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.send_flag {
            return Err(XhrError::InvalidState("withCredentials cannot change after send()"));
        }
        state.with_credentials = include;
        state.request.set_with_credentials(include);
        Ok(())
    }

    fn with_credentials(&self) -> bool {
        self.state.borrow().with_credentials
    }

    fn set_response_type(&self, response_type: ResponseType) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.ready_state >= ReadyState::Loading {
            return Err(XhrError::InvalidState("responseType cannot change once loading"));
        }
        state.response_type = response_type;
        Ok(())
    }

    fn response_type(&self) -> ResponseType {
        self.state.borrow().response_type
    }

    fn override_mime_type(&self, mime: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.ready_state >= ReadyState::Loading {
            return Err(XhrError::InvalidState("overrideMimeType() cannot be called once loading"));
        }
        state.mime_override = Some(mime.to_string());
        Ok(())
    }

    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.registry.borrow_mut().add_listener(kind, listener)
    }

    fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.registry.borrow_mut().remove_listener(kind, id)
    }

    fn set_event_handler(&self, kind: EventKind, handler: Option<Listener>) {
        self.registry.borrow_mut().set_handler(kind, handler);
    }

    async fn send(&self, body: Option<XhrBody>) -> Result<()> {
        let (request, generation) = {
            let mut state = self.state.borrow_mut();
            if state.ready_state != ReadyState::Opened || state.send_flag {
                return Err(XhrError::InvalidState("send() requires an opened, unsent request"));
            }
            state.send_flag = true;
            let bytes = body.as_ref().map(XhrBody::to_bytes);
            (state.request.finish(bytes)?, state.generation)
        };

        tracing::info!("HTTP {} {}", request.method(), request.url());
        self.fire(EventKind::LoadStart, 0, None);

        let result = self.backend.fetch(request).await;
        if !self.is_current(generation) {
            return Ok(());
        }
        match result {
            Ok(response) => self.receive(response, generation).await,
            Err(e) => self.fail(e),
        }
        Ok(())
    }

    fn abort(&self) {
        {
            let mut state = self.state.borrow_mut();
            let in_flight = state.send_flag
                && matches!(
                    state.ready_state,
                    ReadyState::Opened | ReadyState::HeadersReceived | ReadyState::Loading
                );
            if !in_flight {
                return;
            }
            state.generation += 1;
            state.send_flag = false;
            state.error_flag = true;
            state.status = 0;
            state.status_text.clear();
            state.response_headers = Headers::new();
            state.response_bytes.clear();
        }
        self.change_state(ReadyState::Done);
        self.fire(EventKind::Abort, 0, None);
        self.fire(EventKind::LoadEnd, 0, None);
    }

    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state
    }

    fn status(&self) -> u16 {
        self.state.borrow().status
    }

    fn status_text(&self) -> String {
        self.state.borrow().status_text.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        let state = self.state.borrow();
        if state.ready_state < ReadyState::HeadersReceived {
            return None;
        }
        state.response_headers.get(name)
    }

    fn all_response_headers(&self) -> String {
        let state = self.state.borrow();
        if state.ready_state < ReadyState::HeadersReceived {
            return String::new();
        }
        state.response_headers.to_raw()
    }

    fn response_text(&self) -> Result<String> {
        let state = self.state.borrow();
        value::response_text(state.response_type, state.ready_state, &state.response_bytes)
    }

    fn response(&self) -> Result<Option<ResponseValue>> {
        let mime = self.mime();
        let state = self.state.borrow();
        if state.response_type.allows_text() {
            return value::response_text(state.response_type, state.ready_state, &state.response_bytes)
                .map(|t| Some(ResponseValue::Text(t)));
        }
        if state.ready_state != ReadyState::Done || state.error_flag {
            return Ok(None);
        }
        Ok(value::compute(
            state.response_type,
            mime.as_deref(),
            &state.response_bytes,
            self.parser.as_deref(),
        ))
    }

    fn response_xml(&self) -> Result<Option<Document>> {
        let mime = self.mime();
        let state = self.state.borrow();
        if !state.response_type.allows_document() {
            return Err(XhrError::InvalidState(
                "responseXML is only available when responseType is \"\" or \"document\"",
            ));
        }
        if state.ready_state != ReadyState::Done || state.error_flag {
            return Ok(None);
        }
        Ok(value::parse_document(mime.as_deref(), &state.response_bytes, self.parser.as_deref()))
    }

    fn overwrite_ready_state(&self, ready_state: ReadyState) {
        self.state.borrow_mut().ready_state = ready_state;
    }

    fn overwrite_status(&self, status: u16, status_text: &str) {
        let mut state = self.state.borrow_mut();
        state.status = status;
        state.status_text = status_text.to_string();
    }
}

impl std::fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlHttpRequest")
            .field("state", &self.state.borrow())
            .field("registry", &self.registry.borrow())
            .finish_non_exhaustive()
    }
}

//! Transport controller
//!
//! Wraps a `Transport` and forwards every call to it, capturing what is
//! needed to build the canonical `Request`. At `send()` the request
//! handler decides whether the exchange is mocked, failed, or let
//! through. Mocked and failed exchanges are replayed onto the wrapped
//! handle by the `ResponseEmulator`.
//!
//! ```text
//! open / set_request_header / listeners ──► capture ──► forward
//! send ──► Request ──► handler ──┬─ Respond ──► ResponseEmulator
//!                                ├─ Error   ──► ResponseEmulator (error)
//!                                └─ Passthrough ──► tag ──► transport.send
//! ```

mod emulator;

pub(crate) use emulator::ResponseEmulator;

use crate::config::InterceptConfig;
use crate::correlation::{CorrelationGuard, IdGenerator, RequestId};
use crate::document::{Document, DocumentParser};
use crate::error::{Result, XhrError};
use crate::events::{EventKind, EventRegistry, Listener, ListenerId};
use crate::handler::{Decision, RequestHandler};
use crate::headers::{Headers, mime_essence};
use crate::request::RequestNormalizer;
use crate::transport::{ReadyState, ResponseType, Transport, XhrBody};
use crate::value::{self, ResponseValue};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Where the current logical request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Not opened
    Idle,
    /// Opened, not sent
    Opened,
    /// Waiting for the handler
    Deciding,
    /// Replaying a mocked response or error
    Emulating,
    /// Handed to the wrapped transport
    Passthrough,
    /// Mocked exchange complete (or aborted)
    Finished,
}

/// Per-request emulation state
#[derive(Debug)]
pub(crate) struct Exchange {
    pub(crate) phase: Phase,
    /// Set on abort or re-open; checked before every chunk read and dispatch
    pub(crate) cancelled: Rc<Cell<bool>>,
    /// The controller, not the wrapped transport, answers response reads
    pub(crate) takeover: bool,
    pub(crate) errored: bool,
    pub(crate) headers: Headers,
    pub(crate) buffer: Vec<u8>,
    value: OnceCell<Option<ResponseValue>>,
    document: OnceCell<Option<Document>>,
}

impl Exchange {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            cancelled: Rc::new(Cell::new(false)),
            takeover: false,
            errored: false,
            headers: Headers::new(),
            buffer: Vec::new(),
            value: OnceCell::new(),
            document: OnceCell::new(),
        }
    }
}

pub(crate) struct Shared<T> {
    pub(crate) transport: T,
    handler: Rc<dyn RequestHandler>,
    guard: CorrelationGuard,
    parser: Option<Rc<dyn DocumentParser>>,
    normalizer: RefCell<RequestNormalizer>,
    pub(crate) registry: RefCell<EventRegistry>,
    pub(crate) exchange: RefCell<Exchange>,
    /// Controller listener id -> wrapped transport listener id
    forwarded: RefCell<HashMap<ListenerId, ListenerId>>,
    response_type: Cell<ResponseType>,
    mime_override: RefCell<Option<String>>,
}

/// Intercepting wrapper around a `Transport`
pub struct TransportController<T: Transport> {
    inner: Rc<Shared<T>>,
}

impl<T: Transport> Clone for TransportController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Transport> TransportController<T> {
    /// Wrap a transport with default configuration and a private id allocator
    pub fn new(transport: T, handler: impl RequestHandler + 'static) -> Self {
        let config = InterceptConfig::default();
        let ids = Rc::new(IdGenerator::new(config.id_strategy));
        Self::with_parts(transport, Rc::new(handler), ids, &config, default_parser())
    }

    pub(crate) fn with_parts(
        transport: T,
        handler: Rc<dyn RequestHandler>,
        ids: Rc<IdGenerator>,
        config: &InterceptConfig,
        parser: Option<Rc<dyn DocumentParser>>,
    ) -> Self {
        Self {
            inner: Rc::new(Shared {
                transport,
                handler,
                guard: CorrelationGuard::new(ids, config.tag_header.clone()),
                parser,
                normalizer: RefCell::new(RequestNormalizer::new(config.base_url.clone())),
                registry: RefCell::new(EventRegistry::new()),
                exchange: RefCell::new(Exchange::new(Phase::Idle)),
                forwarded: RefCell::new(HashMap::new()),
                response_type: Cell::new(ResponseType::Default),
                mime_override: RefCell::new(None),
            }),
        }
    }

    /// The wrapped transport
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Id of the current logical request
    pub fn request_id(&self) -> Option<RequestId> {
        self.inner.normalizer.borrow().id().cloned()
    }

    /// Is a mocked response (or error) being served instead of the transport's?
    pub fn is_mocked(&self) -> bool {
        self.inner.exchange.borrow().takeover
    }

    /// Bytes accumulated in the response buffer
    pub fn buffered_len(&self) -> usize {
        self.inner.exchange.borrow().buffer.len()
    }

    fn ensure_not_loading(&self, what: &'static str) -> Result<()> {
        if self.inner.transport.ready_state() >= ReadyState::Loading {
            return Err(XhrError::InvalidState(what));
        }
        Ok(())
    }

    /// MIME type used to interpret a mocked body
    fn mocked_mime(&self) -> Option<String> {
        if let Some(mime) = self.inner.mime_override.borrow().as_deref() {
            return Some(mime_essence(mime));
        }
        self.inner.exchange.borrow().headers.mime_essence()
    }

    /// Mocked headers, once the emulated exchange has reached HeadersReceived
    fn mocked_headers(&self) -> Option<Headers> {
        let exchange = self.inner.exchange.borrow();
        let visible = !exchange.errored
            && self.inner.transport.ready_state() >= ReadyState::HeadersReceived;
        visible.then(|| exchange.headers.clone())
    }
}

impl<T: Transport> Transport for TransportController<T> {
    fn open(&self, method: &str, url: &str) -> Result<()> {
        let id = self.inner.guard.allocate();
        self.inner.normalizer.borrow_mut().open(method, url, id.clone())?;

        let previous = self.inner.exchange.replace(Exchange::new(Phase::Opened));
        previous.cancelled.set(true);
        *self.inner.mime_override.borrow_mut() = None;

        debug!("Opened {} {} as {}", method, url, id);
        self.inner.transport.open(method, url)
    }

    fn set_request_header(&self, name: &str, value: &str) -> Result<()> {
        if self.inner.exchange.borrow().phase != Phase::Opened {
            return Err(XhrError::InvalidState("setRequestHeader() requires an opened, unsent request"));
        }
        // Headers the transport refuses never reach the canonical request
        self.inner.transport.set_request_header(name, value)?;
        self.inner.normalizer.borrow_mut().append_header(name, value);
        Ok(())
    }

    fn set_with_credentials(&self, include: bool) -> Result<()> {
        self.inner.transport.set_with_credentials(include)?;
        self.inner.normalizer.borrow_mut().set_with_credentials(include);
        Ok(())
    }

    fn with_credentials(&self) -> bool {
        self.inner.transport.with_credentials()
    }

    fn set_response_type(&self, response_type: ResponseType) -> Result<()> {
        self.ensure_not_loading("responseType cannot change once loading")?;
        self.inner.transport.set_response_type(response_type)?;
        self.inner.response_type.set(response_type);
        Ok(())
    }

    fn response_type(&self) -> ResponseType {
        self.inner.response_type.get()
    }

    fn override_mime_type(&self, mime: &str) -> Result<()> {
        self.ensure_not_loading("overrideMimeType() cannot be called once loading")?;
        self.inner.transport.override_mime_type(mime)?;
        *self.inner.mime_override.borrow_mut() = Some(mime.to_string());
        Ok(())
    }

    fn add_event_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = self
            .inner
            .registry
            .borrow_mut()
            .add_listener(kind, listener.clone());
        let forwarded = self.inner.transport.add_event_listener(kind, listener);
        self.inner.forwarded.borrow_mut().insert(id, forwarded);
        id
    }

    fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let removed = self.inner.registry.borrow_mut().remove_listener(kind, id);
        if let Some(forwarded) = self.inner.forwarded.borrow_mut().remove(&id) {
            self.inner.transport.remove_event_listener(kind, forwarded);
        }
        removed
    }

    fn set_event_handler(&self, kind: EventKind, handler: Option<Listener>) {
        self.inner
            .registry
            .borrow_mut()
            .set_handler(kind, handler.clone());
        self.inner.transport.set_event_handler(kind, handler);
    }

    async fn send(&self, body: Option<XhrBody>) -> Result<()> {
        if self.inner.exchange.borrow().phase != Phase::Opened {
            return Err(XhrError::InvalidState("send() requires an opened, unsent request"));
        }

        let (request, tagged) = {
            let normalizer = self.inner.normalizer.borrow();
            let request = normalizer.finish(body.as_ref().map(XhrBody::to_bytes))?;
            (request, self.inner.guard.recognize(normalizer.headers()))
        };

        // Another layer already consulted its handler for this request
        if let Some(owner) = tagged {
            debug!("Request {} was handled by an outer layer, forwarding", owner);
            self.inner.exchange.borrow_mut().phase = Phase::Passthrough;
            return self.inner.transport.send(body).await;
        }

        let id = request.id().clone();
        let cancelled = {
            let mut exchange = self.inner.exchange.borrow_mut();
            exchange.phase = Phase::Deciding;
            exchange.cancelled.clone()
        };
        debug!("Dispatching {} {} ({}) to request handler", request.method(), request.url(), id);

        let decision = self.inner.handler.handle(request, id.clone()).await;
        if cancelled.get() {
            debug!("Request {} was aborted before the handler decided", id);
            return Ok(());
        }

        let emulator = ResponseEmulator::new(&self.inner, cancelled);
        match decision {
            Ok(Decision::Respond(response)) => {
                debug!("Request {} mocked with status {}", id, response.status());
                emulator.respond_with(response).await;
            }
            Ok(Decision::Error(reason)) => {
                debug!("Request {} failed by handler: {}", id, reason);
                emulator.error_with(&reason);
            }
            Err(fault) => {
                warn!("Request handler failed for {}: {:#}", id, fault);
                emulator.error_with(&fault.to_string());
            }
            Ok(Decision::Passthrough) => {
                debug!("No mocked response for {}, performing request as-is", id);
                self.inner.exchange.borrow_mut().phase = Phase::Passthrough;
                self.inner
                    .transport
                    .set_request_header(self.inner.guard.header_name(), id.as_str())?;
                return self.inner.transport.send(body).await;
            }
        }
        Ok(())
    }

    fn abort(&self) {
        let cancelled = {
            let mut exchange = self.inner.exchange.borrow_mut();
            match exchange.phase {
                Phase::Deciding | Phase::Emulating => {
                    exchange.phase = Phase::Finished;
                    exchange.takeover = true;
                    exchange.errored = true;
                    Some(exchange.cancelled.clone())
                }
                _ => None,
            }
        };

        match cancelled {
            Some(cancelled) => {
                debug!("Aborting intercepted request");
                cancelled.set(true);
                ResponseEmulator::new(&self.inner, cancelled).abort();
            }
            None => self.inner.transport.abort(),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.transport.ready_state()
    }

    fn status(&self) -> u16 {
        self.inner.transport.status()
    }

    fn status_text(&self) -> String {
        self.inner.transport.status_text()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        if !self.is_mocked() {
            return self.inner.transport.response_header(name);
        }
        self.mocked_headers().and_then(|h| h.get(name))
    }

    fn all_response_headers(&self) -> String {
        if !self.is_mocked() {
            return self.inner.transport.all_response_headers();
        }
        self.mocked_headers()
            .map(|h| h.to_raw())
            .unwrap_or_default()
    }

    fn response_text(&self) -> Result<String> {
        if !self.is_mocked() {
            return self.inner.transport.response_text();
        }
        let response_type = self.inner.response_type.get();
        let exchange = self.inner.exchange.borrow();
        let state = if exchange.errored {
            ReadyState::Unsent
        } else {
            self.inner.transport.ready_state()
        };
        value::response_text(response_type, state, &exchange.buffer)
    }

    fn response(&self) -> Result<Option<ResponseValue>> {
        if !self.is_mocked() {
            return self.inner.transport.response();
        }
        let response_type = self.inner.response_type.get();
        if response_type.allows_text() {
            return self.response_text().map(|t| Some(ResponseValue::Text(t)));
        }

        let state = self.inner.transport.ready_state();

        let mime = self.mocked_mime();
        let exchange = self.inner.exchange.borrow();
        if exchange.errored || state != ReadyState::Done {
            return Ok(None);
        }
        let value = exchange.value.get_or_init(|| {
            value::compute(
                response_type,
                mime.as_deref(),
                &exchange.buffer,
                self.inner.parser.as_deref(),
            )
        });
        Ok(value.clone())
    }

    fn response_xml(&self) -> Result<Option<Document>> {
        if !self.is_mocked() {
            return self.inner.transport.response_xml();
        }
        if !self.inner.response_type.get().allows_document() {
            return Err(XhrError::InvalidState(
                "responseXML is only available when responseType is \"\" or \"document\"",
            ));
        }

        let mime = self.mocked_mime();
        let exchange = self.inner.exchange.borrow();
        if exchange.errored || self.inner.transport.ready_state() != ReadyState::Done {
            return Ok(None);
        }
        let document = exchange.document.get_or_init(|| {
            value::parse_document(mime.as_deref(), &exchange.buffer, self.inner.parser.as_deref())
        });
        Ok(document.clone())
    }

    fn overwrite_ready_state(&self, state: ReadyState) {
        self.inner.transport.overwrite_ready_state(state);
    }

    fn overwrite_status(&self, status: u16, status_text: &str) {
        self.inner.transport.overwrite_status(status, status_text);
    }
}

/// Document parser used when none is configured
pub(crate) fn default_parser() -> Option<Rc<dyn DocumentParser>> {
    #[cfg(feature = "html")]
    {
        Some(Rc::new(crate::document::HtmlDocumentParser::new()))
    }
    #[cfg(not(feature = "html"))]
    {
        None
    }
}

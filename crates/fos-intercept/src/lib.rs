//! fOS Intercept
//!
//! XMLHttpRequest interception and response emulation.
//!
//! A `TransportController` wraps any `Transport` (the native
//! `XmlHttpRequest`, or another controller) and asks a `RequestHandler`
//! what to do with each request: answer it with a mocked `Response`, fail
//! it as a network error, or let it through. Mocked exchanges are replayed
//! onto the wrapped handle with the same ready states and events a genuine
//! exchange produces.
//!
//! ```text
//! caller ──► TransportController ──► [TransportController ...] ──► XmlHttpRequest
//!                   │
//!                   └── RequestHandler (Respond / Error / Passthrough)
//! ```

pub mod body;
pub mod config;
pub mod controller;
pub mod correlation;
pub mod document;
pub mod error;
pub mod events;
pub mod handler;
pub mod headers;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod testing;
pub mod transport;
pub mod value;
pub mod xhr;

pub use body::Body;
pub use config::InterceptConfig;
pub use controller::TransportController;
pub use correlation::{CorrelationGuard, IdGenerator, IdStrategy, REQUEST_ID_HEADER, RequestId};
pub use document::{Document, DocumentNode, DocumentParser};
#[cfg(feature = "html")]
pub use document::HtmlDocumentParser;
pub use error::{BodyError, Result, XhrError};
pub use events::{Event, EventKind, Listener, ListenerId};
pub use handler::{Decision, PassthroughHandler, RequestHandler};
pub use headers::Headers;
pub use interceptor::Interceptor;
pub use request::{Credentials, Request, RequestNormalizer};
pub use response::Response;
pub use transport::{ReadyState, ResponseType, Transport, XhrBody};
pub use value::ResponseValue;
pub use xhr::{NetworkBackend, UnavailableBackend, XmlHttpRequest};
#[cfg(feature = "reqwest")]
pub use xhr::ReqwestBackend;
pub use url::Url;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

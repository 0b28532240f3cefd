//! Interceptor
//!
//! Builds transport controllers that share one configuration, one request
//! handler and one id allocator. Controllers from the same interceptor
//! never hand out the same request id, so stacking two of them still
//! consults the handler once per request.

use crate::config::InterceptConfig;
use crate::controller::{TransportController, default_parser};
use crate::correlation::IdGenerator;
use crate::document::DocumentParser;
use crate::handler::RequestHandler;
use crate::transport::Transport;
use std::rc::Rc;

/// Factory for intercepting transports
pub struct Interceptor {
    config: InterceptConfig,
    handler: Rc<dyn RequestHandler>,
    ids: Rc<IdGenerator>,
    parser: Option<Rc<dyn DocumentParser>>,
}

impl Interceptor {
    pub fn new(config: InterceptConfig, handler: impl RequestHandler + 'static) -> Self {
        tracing::debug!(
            "Creating interceptor (base {}, tag header {})",
            config.base_url,
            config.tag_header
        );
        Self {
            ids: Rc::new(IdGenerator::new(config.id_strategy)),
            handler: Rc::new(handler),
            parser: default_parser(),
            config,
        }
    }

    /// Use `parser` for `responseXML` and document responses; `None`
    /// leaves documents unparsed.
    pub fn with_document_parser(mut self, parser: Option<Rc<dyn DocumentParser>>) -> Self {
        self.parser = parser;
        self
    }

    /// Wrap a transport
    pub fn wrap<T: Transport>(&self, transport: T) -> TransportController<T> {
        TransportController::with_parts(
            transport,
            self.handler.clone(),
            self.ids.clone(),
            &self.config,
            self.parser.clone(),
        )
    }

    pub fn config(&self) -> &InterceptConfig {
        &self.config
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("config", &self.config)
            .field("document_parser", &self.parser.is_some())
            .finish_non_exhaustive()
    }
}

//! Request handler contract
//!
//! The handler decides, asynchronously, what happens to an intercepted
//! request. Failing with an error is a handler fault: the controller
//! reports it to the handle's listeners as a network error.

use crate::correlation::RequestId;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;

/// What to do with an intercepted request
#[derive(Debug)]
pub enum Decision {
    /// Reply with a mocked response
    Respond(Response),
    /// Fail the request as a network error
    Error(String),
    /// Let the request reach the real transport
    Passthrough,
}

impl Decision {
    pub fn respond(response: Response) -> Self {
        Decision::Respond(response)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Decision::Error(reason.into())
    }
}

/// Eventual handler outcome
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Decision>>>>;

/// Decides the fate of intercepted requests
pub trait RequestHandler {
    fn handle(&self, request: Request, id: RequestId) -> HandlerFuture;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Request, RequestId) -> Fut,
    Fut: Future<Output = anyhow::Result<Decision>> + 'static,
{
    fn handle(&self, request: Request, id: RequestId) -> HandlerFuture {
        Box::pin(self(request, id))
    }
}

/// Handler that lets every request through
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughHandler;

impl RequestHandler for PassthroughHandler {
    fn handle(&self, _request: Request, _id: RequestId) -> HandlerFuture {
        Box::pin(async { Ok(Decision::Passthrough) })
    }
}

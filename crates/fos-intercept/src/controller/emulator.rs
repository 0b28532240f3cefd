//! Response emulation
//!
//! Replays a mocked response onto the wrapped transport so that its
//! listeners observe the same state transitions and events as a genuine
//! network exchange:
//!
//! ```text
//! loadstart
//! readystatechange (HEADERS_RECEIVED)
//! readystatechange (LOADING)
//! progress × chunks
//! readystatechange (DONE)
//! load
//! loadend
//! ```
//!
//! Failures skip body delivery: `readystatechange (DONE)`, `error`,
//! `loadend`. Every dispatch and chunk read first checks the cancellation
//! flag, so nothing is delivered after an abort.

use super::{Phase, Shared};
use crate::events::{Event, EventKind, dispatch};
use crate::response::Response;
use crate::transport::{ReadyState, Transport};
use smol::stream::StreamExt;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Drives one mocked exchange
pub(crate) struct ResponseEmulator<'a, T> {
    shared: &'a Shared<T>,
    cancelled: Rc<Cell<bool>>,
}

impl<'a, T: Transport> ResponseEmulator<'a, T> {
    pub(crate) fn new(shared: &'a Shared<T>, cancelled: Rc<Cell<bool>>) -> Self {
        Self { shared, cancelled }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Write the next ready state. Returns false for a no-op: re-entering
    /// the current state, moving backwards, or leaving DONE.
    fn set_state(&self, next: ReadyState) -> bool {
        let current = self.shared.transport.ready_state();
        if next <= current {
            if next < current {
                trace!("Ignoring ready state transition {:?} -> {:?}", current, next);
            }
            return false;
        }
        self.shared.transport.overwrite_ready_state(next);
        true
    }

    /// Transition and announce it
    pub(crate) fn transition(&self, next: ReadyState) {
        if self.is_cancelled() {
            return;
        }
        if self.set_state(next) {
            self.emit(Event::new(EventKind::ReadyStateChange, next));
        }
    }

    fn emit(&self, event: Event) {
        if self.is_cancelled() {
            return;
        }
        self.dispatch(event);
    }

    fn dispatch(&self, event: Event) {
        let listeners = self.shared.registry.borrow().snapshot(event.kind);
        trace!("Dispatching {} to {} listener(s)", event.kind, listeners.len());
        dispatch(&listeners, &event);
    }

    fn state(&self) -> ReadyState {
        self.shared.transport.ready_state()
    }

    fn begin(&self) {
        let mut exchange = self.shared.exchange.borrow_mut();
        exchange.phase = Phase::Emulating;
        exchange.takeover = true;
    }

    fn finish(&self) {
        let mut exchange = self.shared.exchange.borrow_mut();
        if !self.is_cancelled() {
            exchange.phase = Phase::Finished;
        }
    }

    /// Replay a mocked response to completion
    pub(crate) async fn respond_with(&self, response: Response) {
        if self.is_cancelled() {
            return;
        }
        self.begin();

        let (status, status_text, headers, body) = response.into_parts();
        let total = headers.content_length();
        {
            let mut exchange = self.shared.exchange.borrow_mut();
            exchange.headers = headers;
            exchange.buffer.clear();
        }

        self.emit(Event::progress(EventKind::LoadStart, self.state(), 0, total));
        if self.is_cancelled() {
            return;
        }
        self.shared.transport.overwrite_status(status, &status_text);
        self.transition(ReadyState::HeadersReceived);
        self.transition(ReadyState::Loading);

        if let Some(body) = body {
            let mut chunks = body.into_stream();
            loop {
                if self.is_cancelled() {
                    return;
                }
                let next = chunks.next().await;
                if self.is_cancelled() {
                    return;
                }

                match next {
                    Some(Ok(chunk)) if chunk.is_empty() => continue,
                    Some(Ok(chunk)) => {
                        let loaded = {
                            let mut exchange = self.shared.exchange.borrow_mut();
                            exchange.buffer.extend_from_slice(&chunk);
                            exchange.buffer.len() as u64
                        };
                        trace!("Received {} byte chunk ({} total)", chunk.len(), loaded);
                        self.emit(Event::progress(EventKind::Progress, ReadyState::Loading, loaded, total));
                    }
                    Some(Err(e)) => {
                        warn!("Mocked response body failed: {}", e);
                        self.error_with(&e.to_string());
                        return;
                    }
                    None => break,
                }
            }
        }

        if self.is_cancelled() {
            return;
        }
        let loaded = self.shared.exchange.borrow().buffer.len() as u64;
        self.transition(ReadyState::Done);
        self.emit(Event::progress(EventKind::Load, ReadyState::Done, loaded, total));
        self.emit(Event::progress(EventKind::LoadEnd, ReadyState::Done, loaded, total));
        self.finish();
    }

    /// Fail the exchange as a network error
    pub(crate) fn error_with(&self, reason: &str) {
        debug!("Emulating network error: {}", reason);
        self.begin();
        self.shared.exchange.borrow_mut().errored = true;
        self.shared.transport.overwrite_status(0, "");

        self.transition(ReadyState::Done);
        self.emit(Event::new(EventKind::Error, ReadyState::Done));
        self.emit(Event::new(EventKind::LoadEnd, ReadyState::Done));
        self.finish();
    }

    /// Announce an abort. Runs after the cancellation flag is raised, so it
    /// bypasses the flag.
    pub(crate) fn abort(&self) {
        self.shared.transport.overwrite_status(0, "");
        let loaded = self.shared.exchange.borrow().buffer.len() as u64;
        if self.set_state(ReadyState::Done) {
            self.dispatch(Event::new(EventKind::ReadyStateChange, ReadyState::Done));
        }
        self.dispatch(Event::progress(EventKind::Abort, ReadyState::Done, loaded, None));
        self.dispatch(Event::progress(EventKind::LoadEnd, ReadyState::Done, loaded, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TransportController;
    use crate::events::Listener;
    use crate::handler::PassthroughHandler;
    use crate::testing::RecordingTransport;
    use std::cell::RefCell;

    fn controller() -> (TransportController<RecordingTransport>, Rc<RefCell<Vec<Event>>>) {
        let controller = TransportController::new(RecordingTransport::new(), PassthroughHandler);
        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        let listener: Listener = Rc::new(move |e: &Event| log.borrow_mut().push(e.clone()));
        controller.open("GET", "/").unwrap();
        controller.add_event_listener(EventKind::ReadyStateChange, listener);
        (controller, events)
    }

    #[test]
    fn test_reentering_current_state_is_noop() {
        let (controller, events) = controller();
        let emulator = ResponseEmulator::new(&controller.inner, Rc::new(Cell::new(false)));

        emulator.transition(ReadyState::HeadersReceived);
        emulator.transition(ReadyState::HeadersReceived);
        emulator.transition(ReadyState::HeadersReceived);

        assert_eq!(events.borrow().len(), 1);
        assert_eq!(controller.ready_state(), ReadyState::HeadersReceived);
    }

    #[test]
    fn test_no_backwards_transition() {
        let (controller, events) = controller();
        let emulator = ResponseEmulator::new(&controller.inner, Rc::new(Cell::new(false)));

        emulator.transition(ReadyState::Done);
        emulator.transition(ReadyState::Loading);

        assert_eq!(events.borrow().len(), 1);
        assert_eq!(controller.ready_state(), ReadyState::Done);
    }

    #[test]
    fn test_cancelled_emulator_is_silent() {
        let (controller, events) = controller();
        let emulator = ResponseEmulator::new(&controller.inner, Rc::new(Cell::new(true)));

        smol::block_on(emulator.respond_with(Response::text("ignored")));

        assert!(events.borrow().is_empty());
        assert_eq!(controller.buffered_len(), 0);
    }

    #[test]
    fn test_error_on_fresh_request() {
        let (controller, events) = controller();
        let emulator = ResponseEmulator::new(&controller.inner, Rc::new(Cell::new(false)));

        emulator.error_with("boom");

        assert_eq!(controller.ready_state(), ReadyState::Done);
        assert_eq!(controller.status(), 0);
        assert_eq!(controller.buffered_len(), 0);
        assert_eq!(events.borrow().last().unwrap().ready_state, ReadyState::Done);
    }
}

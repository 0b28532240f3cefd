//! Response emulation tests for fos-intercept
//!
//! Drives controllers wrapped around the in-memory transport and checks
//! what callers observe: events, ready states and response values.

use bytes::Bytes;
use fos_intercept::testing::{RecordingTransport, TransportCall};
use fos_intercept::{
    Decision, Event, EventKind, InterceptConfig, Interceptor, ReadyState, Request, RequestId,
    Response, ResponseType, Transport, TransportController, REQUEST_ID_HEADER,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const ALL_EVENTS: [EventKind; 7] = [
    EventKind::ReadyStateChange,
    EventKind::LoadStart,
    EventKind::Progress,
    EventKind::Load,
    EventKind::LoadEnd,
    EventKind::Error,
    EventKind::Abort,
];

fn mocked(response: impl Fn() -> Response + 'static) -> TransportController<RecordingTransport> {
    let handler = move |_: Request, _: RequestId| {
        let response = response();
        async move { anyhow::Ok(Decision::respond(response)) }
    };
    TransportController::new(RecordingTransport::new(), handler)
}

fn record_all<T: Transport>(transport: &T) -> Rc<RefCell<Vec<Event>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    for kind in ALL_EVENTS {
        let log = events.clone();
        transport.add_event_listener(kind, Rc::new(move |e: &Event| log.borrow_mut().push(e.clone())));
    }
    events
}

fn kinds(events: &[Event]) -> Vec<(EventKind, ReadyState)> {
    events.iter().map(|e| (e.kind, e.ready_state)).collect()
}

fn chunks(parts: &[&'static str]) -> impl smol::stream::Stream<Item = std::io::Result<Bytes>> + 'static {
    let items: Vec<std::io::Result<Bytes>> =
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
    smol::stream::iter(items)
}

// ============================================================================
// EVENT SEQUENCE
// ============================================================================

#[test]
fn test_mocked_text_event_order() {
    let controller = mocked(|| {
        Response::new(201)
            .with_header("Content-Type", "text/plain")
            .with_body("hello")
    });
    controller.open("GET", "/greeting").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(
        kinds(&events.borrow()),
        vec![
            (EventKind::LoadStart, ReadyState::Opened),
            (EventKind::ReadyStateChange, ReadyState::HeadersReceived),
            (EventKind::ReadyStateChange, ReadyState::Loading),
            (EventKind::Progress, ReadyState::Loading),
            (EventKind::ReadyStateChange, ReadyState::Done),
            (EventKind::Load, ReadyState::Done),
            (EventKind::LoadEnd, ReadyState::Done),
        ]
    );
    let progress: Vec<u64> = events
        .borrow()
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .map(|e| e.loaded)
        .collect();
    assert_eq!(progress, vec![5]);

    assert_eq!(controller.status(), 201);
    assert_eq!(controller.status_text(), "Created");
    assert_eq!(controller.response_text().unwrap(), "hello");
    assert!(controller.is_mocked());
}

#[test]
fn test_streamed_body_progress_is_cumulative() {
    let controller = mocked(|| Response::new(200).with_stream(chunks(&["a", "b", "c"])));
    controller.open("GET", "/stream").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let progress: Vec<(u64, Option<u64>)> = events
        .borrow()
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .map(|e| (e.loaded, e.total))
        .collect();
    assert_eq!(progress, vec![(1, None), (2, None), (3, None)]);
    assert_eq!(controller.response_text().unwrap(), "abc");
}

#[test]
fn test_content_length_sets_total() {
    let controller = mocked(|| Response::text("four"));
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let load = events
        .borrow()
        .iter()
        .find(|e| e.kind == EventKind::Load)
        .cloned()
        .unwrap();
    assert_eq!(load.loaded, 4);
    assert_eq!(load.total, Some(4));
    assert!(load.length_computable());
}

#[test]
fn test_empty_chunks_fire_no_progress() {
    let controller = mocked(|| Response::new(200).with_stream(chunks(&["", "x", ""])));
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let progress = events
        .borrow()
        .iter()
        .filter(|e| e.kind == EventKind::Progress)
        .count();
    assert_eq!(progress, 1);
}

#[test]
fn test_partial_text_visible_while_loading() {
    let controller = mocked(|| Response::new(200).with_stream(chunks(&["a", "b", "c"])));
    controller.open("GET", "/").unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let reader = controller.clone();
    let log = seen.clone();
    controller.add_event_listener(
        EventKind::Progress,
        Rc::new(move |_: &Event| log.borrow_mut().push(reader.response_text().unwrap())),
    );

    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(*seen.borrow(), vec!["a", "ab", "abc"]);
}

#[test]
fn test_no_native_send_for_mocked_request() {
    let controller = mocked(|| Response::text("mock"));
    controller.open("GET", "/").unwrap();
    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(controller.transport().send_count(), 0);
    assert!(controller.transport().fetched().is_empty());
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_error_decision_on_fresh_request() {
    let handler = |_: Request, _: RequestId| async { anyhow::Ok(Decision::error("refused")) };
    let controller = TransportController::new(RecordingTransport::new(), handler);
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let non_state: Vec<EventKind> = events
        .borrow()
        .iter()
        .map(|e| e.kind)
        .filter(|k| *k != EventKind::ReadyStateChange)
        .collect();
    assert_eq!(non_state, vec![EventKind::Error, EventKind::LoadEnd]);
    assert_eq!(controller.ready_state(), ReadyState::Done);
    assert_eq!(controller.status(), 0);
    assert_eq!(controller.buffered_len(), 0);
    assert_eq!(controller.response_text().unwrap(), "");
    assert_eq!(controller.all_response_headers(), "");
}

#[test]
fn test_handler_fault_becomes_network_error() {
    let handler =
        |_: Request, _: RequestId| async { Err::<Decision, _>(anyhow::anyhow!("handler crashed")) };
    let controller = TransportController::new(RecordingTransport::new(), handler);
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    assert!(smol::block_on(controller.send(None)).is_ok());

    let non_state: Vec<EventKind> = events
        .borrow()
        .iter()
        .map(|e| e.kind)
        .filter(|k| *k != EventKind::ReadyStateChange)
        .collect();
    assert_eq!(non_state, vec![EventKind::Error, EventKind::LoadEnd]);
    assert_eq!(controller.status(), 0);
}

#[test]
fn test_failing_stream_errors_after_partial_body() {
    let controller = mocked(|| {
        let parts: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("connection reset")),
        ];
        Response::new(200).with_stream(smol::stream::iter(parts))
    });
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let non_state: Vec<EventKind> = events
        .borrow()
        .iter()
        .map(|e| e.kind)
        .filter(|k| *k != EventKind::ReadyStateChange)
        .collect();
    assert_eq!(
        non_state,
        vec![EventKind::LoadStart, EventKind::Progress, EventKind::Error, EventKind::LoadEnd]
    );
    assert_eq!(controller.status(), 0);
    assert_eq!(controller.ready_state(), ReadyState::Done);
}

// ============================================================================
// PARITY WITH THE NATIVE HANDLE
// ============================================================================

/// `(ready_state, status)` as read live from inside each `loadstart` listener
fn status_at_loadstart<T: Transport + Clone + 'static>(transport: &T) -> Rc<RefCell<Vec<(ReadyState, u16)>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let reader = transport.clone();
    transport.add_event_listener(
        EventKind::LoadStart,
        Rc::new(move |_: &Event| log.borrow_mut().push((reader.ready_state(), reader.status()))),
    );
    seen
}

#[test]
fn test_status_hidden_at_loadstart() {
    let controller = mocked(|| Response::new(201).with_body("hello"));
    controller.open("GET", "/").unwrap();
    let mocked_seen = status_at_loadstart(&controller);
    smol::block_on(controller.send(None)).unwrap();

    let passthrough = |_: Request, _: RequestId| async { anyhow::Ok(Decision::Passthrough) };
    let native = TransportController::new(
        RecordingTransport::new().with_reply(201, "text/plain", "hello"),
        passthrough,
    );
    native.open("GET", "/").unwrap();
    let native_seen = status_at_loadstart(&native);
    smol::block_on(native.send(None)).unwrap();

    assert_eq!(*mocked_seen.borrow(), vec![(ReadyState::Opened, 0)]);
    assert_eq!(*mocked_seen.borrow(), *native_seen.borrow());
    assert_eq!(controller.status(), 201);
}

#[test]
fn test_text_response_matches_native_before_send() {
    let controller = mocked(|| Response::text("later"));
    controller.open("GET", "/").unwrap();
    let native = RecordingTransport::new();
    native.open("GET", "/").unwrap();

    let expected = Some(fos_intercept::ResponseValue::Text(String::new()));
    assert_eq!(controller.response().unwrap(), expected);
    assert_eq!(native.response().unwrap(), expected);
}

#[test]
fn test_text_response_matches_native_after_error() {
    let handler = |_: Request, _: RequestId| async { anyhow::Ok(Decision::error("x")) };
    let controller = TransportController::new(RecordingTransport::new(), handler);
    controller.open("GET", "/").unwrap();
    smol::block_on(controller.send(None)).unwrap();

    let native = RecordingTransport::new().offline();
    native.open("GET", "/").unwrap();
    smol::block_on(native.send(None)).unwrap();

    assert!(controller.is_mocked());
    assert_eq!(controller.response().unwrap(), native.response().unwrap());
    assert_eq!(
        controller.response().unwrap(),
        Some(fos_intercept::ResponseValue::Text(String::new()))
    );
}

#[test]
fn test_text_response_after_abort() {
    let controller = mocked(|| Response::new(200).with_stream(chunks(&["a", "b"])));
    controller.open("GET", "/").unwrap();
    let aborter = controller.clone();
    controller.add_event_listener(EventKind::Progress, Rc::new(move |_: &Event| aborter.abort()));

    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(
        controller.response().unwrap(),
        Some(fos_intercept::ResponseValue::Text(String::new()))
    );
}

// ============================================================================
// ABORT
// ============================================================================

#[test]
fn test_abort_from_progress_listener() {
    let controller = mocked(|| Response::new(200).with_stream(chunks(&["a", "b", "c"])));
    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);

    let aborter = controller.clone();
    controller.add_event_listener(EventKind::Progress, Rc::new(move |_: &Event| aborter.abort()));

    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(
        kinds(&events.borrow()),
        vec![
            (EventKind::LoadStart, ReadyState::Opened),
            (EventKind::ReadyStateChange, ReadyState::HeadersReceived),
            (EventKind::ReadyStateChange, ReadyState::Loading),
            (EventKind::Progress, ReadyState::Loading),
            (EventKind::ReadyStateChange, ReadyState::Done),
            (EventKind::Abort, ReadyState::Done),
            (EventKind::LoadEnd, ReadyState::Done),
        ]
    );
    assert_eq!(controller.status(), 0);
    assert_eq!(controller.response_text().unwrap(), "");
    assert_eq!(controller.transport().send_count(), 0);
}

#[test]
fn test_abort_while_handler_decides() {
    let slot: Rc<RefCell<Option<TransportController<RecordingTransport>>>> = Rc::new(RefCell::new(None));
    let target = slot.clone();
    let handler = move |_: Request, _: RequestId| {
        if let Some(controller) = target.borrow().as_ref() {
            controller.abort();
        }
        async { anyhow::Ok(Decision::respond(Response::text("too late"))) }
    };
    let controller = TransportController::new(RecordingTransport::new(), handler);
    *slot.borrow_mut() = Some(controller.clone());

    controller.open("GET", "/").unwrap();
    let events = record_all(&controller);
    smol::block_on(controller.send(None)).unwrap();

    let observed: Vec<EventKind> = events.borrow().iter().map(|e| e.kind).collect();
    assert_eq!(
        observed,
        vec![EventKind::ReadyStateChange, EventKind::Abort, EventKind::LoadEnd]
    );
    assert_eq!(controller.ready_state(), ReadyState::Done);
    assert_eq!(controller.response_text().unwrap(), "");
    slot.borrow_mut().take();
}

#[test]
fn test_abort_after_completion_is_forwarded() {
    let controller = mocked(|| Response::text("done"));
    controller.open("GET", "/").unwrap();
    smol::block_on(controller.send(None)).unwrap();
    let events = record_all(&controller);

    controller.abort();

    assert!(events.borrow().is_empty());
    assert_eq!(controller.transport().calls().last(), Some(&TransportCall::Abort));
    assert_eq!(controller.response_text().unwrap(), "done");
}

#[test]
fn test_reopen_starts_fresh_request() {
    let controller = mocked(|| Response::text("first"));
    controller.open("GET", "/one").unwrap();
    smol::block_on(controller.send(None)).unwrap();
    let first = controller.request_id().unwrap();

    controller.open("GET", "/two").unwrap();

    assert_ne!(controller.request_id().unwrap(), first);
    assert!(!controller.is_mocked());
    assert_eq!(controller.ready_state(), ReadyState::Opened);
    assert_eq!(controller.buffered_len(), 0);
}

// ============================================================================
// RESPONSE VALUES
// ============================================================================

#[test]
fn test_json_response_type() {
    let controller = mocked(|| Response::json(&serde_json::json!({ "id": 7, "name": "fos" })).unwrap());
    controller.open("GET", "/item").unwrap();
    controller.set_response_type(ResponseType::Json).unwrap();

    smol::block_on(controller.send(None)).unwrap();

    let value = controller.response().unwrap().unwrap();
    assert_eq!(value.as_json().unwrap()["id"], 7);
    assert!(controller.response_text().is_err());
}

#[test]
fn test_invalid_json_is_null() {
    let controller = mocked(|| Response::text("{ not json"));
    controller.open("GET", "/").unwrap();
    controller.set_response_type(ResponseType::Json).unwrap();

    smol::block_on(controller.send(None)).unwrap();

    assert!(controller.response().unwrap().is_none());
}

#[test]
fn test_array_buffer_response() {
    let controller = mocked(|| Response::new(200).with_body(vec![0u8, 1, 2, 255]));
    controller.open("GET", "/bin").unwrap();
    controller.set_response_type(ResponseType::ArrayBuffer).unwrap();

    smol::block_on(controller.send(None)).unwrap();

    let value = controller.response().unwrap().unwrap();
    assert_eq!(value.as_bytes().unwrap().as_ref(), &[0u8, 1, 2, 255]);
}

#[test]
fn test_document_read_rejected_for_array_buffer() {
    let controller = mocked(|| Response::text("<p>x</p>").with_header("Content-Type", "text/html"));
    controller.open("GET", "/").unwrap();
    controller.set_response_type(ResponseType::ArrayBuffer).unwrap();

    smol::block_on(controller.send(None)).unwrap();

    assert!(matches!(
        controller.response_xml(),
        Err(fos_intercept::XhrError::InvalidState(_))
    ));
}

#[cfg(feature = "html")]
#[test]
fn test_html_response_xml() {
    let controller = mocked(|| {
        Response::new(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body("<html><body><p>hi there</p></body></html>")
    });
    controller.open("GET", "/page").unwrap();

    smol::block_on(controller.send(None)).unwrap();

    let document = controller.response_xml().unwrap().unwrap();
    assert_eq!(document.find("p").unwrap().text_content(), "hi there");
}

#[test]
fn test_override_mime_type_drives_document_parsing() {
    let controller = mocked(|| Response::new(200).with_body("<p>plain</p>"));
    controller.open("GET", "/").unwrap();
    controller.override_mime_type("application/octet-stream").unwrap();

    smol::block_on(controller.send(None)).unwrap();

    assert!(controller.response_xml().unwrap().is_none());
}

#[test]
fn test_all_response_headers_format() {
    let controller = mocked(|| {
        Response::new(200)
            .with_header("X-Trace", "a")
            .with_header("Content-Type", "text/plain")
            .with_header("x-trace", "b")
            .with_body("ok")
    });
    controller.open("GET", "/").unwrap();

    smol::block_on(controller.send(None)).unwrap();

    assert_eq!(
        controller.all_response_headers(),
        "content-type: text/plain\r\nx-trace: a, b\r\n"
    );
    assert_eq!(controller.response_header("X-TRACE").as_deref(), Some("a, b"));
}

// ============================================================================
// PASSTHROUGH AND STACKING
// ============================================================================

#[test]
fn test_passthrough_tags_native_request() {
    let handler = |_: Request, _: RequestId| async { anyhow::Ok(Decision::Passthrough) };
    let transport = RecordingTransport::new().with_reply(200, "text/plain", "real");
    let controller = TransportController::new(transport, handler);
    controller.open("GET", "/real").unwrap();
    let events = record_all(&controller);

    smol::block_on(controller.send(None)).unwrap();

    let fetched = controller.transport().fetched();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].header(REQUEST_ID_HEADER), Some("req-1".to_string()));
    assert!(!controller.is_mocked());
    assert_eq!(controller.response_text().unwrap(), "real");

    let observed: Vec<EventKind> = events
        .borrow()
        .iter()
        .map(|e| e.kind)
        .filter(|k| *k != EventKind::ReadyStateChange)
        .collect();
    assert_eq!(
        observed,
        vec![EventKind::LoadStart, EventKind::Progress, EventKind::Load, EventKind::LoadEnd]
    );
}

#[test]
fn test_stacked_controllers_consult_handler_once() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let handler = move |_: Request, _: RequestId| {
        counter.set(counter.get() + 1);
        async { anyhow::Ok(Decision::Passthrough) }
    };
    let interceptor = Interceptor::new(InterceptConfig::default(), handler);
    let outer = interceptor.wrap(interceptor.wrap(RecordingTransport::new()));

    outer.open("GET", "/").unwrap();
    smol::block_on(outer.send(None)).unwrap();

    assert_eq!(calls.get(), 1);
    let native = outer.transport().transport();
    assert_eq!(native.send_count(), 1);
    assert_eq!(native.fetched()[0].header(REQUEST_ID_HEADER), Some("req-1".to_string()));
}

#[test]
fn test_stacked_mock_fires_each_event_once() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let handler = move |_: Request, _: RequestId| {
        counter.set(counter.get() + 1);
        async { anyhow::Ok(Decision::respond(Response::text("layered"))) }
    };
    let interceptor = Interceptor::new(InterceptConfig::default(), handler);
    let outer = interceptor.wrap(interceptor.wrap(RecordingTransport::new()));
    outer.open("GET", "/").unwrap();
    let events = record_all(&outer);

    smol::block_on(outer.send(None)).unwrap();

    assert_eq!(calls.get(), 1);
    let state_changes = events
        .borrow()
        .iter()
        .filter(|e| e.kind == EventKind::ReadyStateChange)
        .count();
    assert_eq!(state_changes, 3);
    assert_eq!(outer.response_text().unwrap(), "layered");
    assert_eq!(outer.transport().transport().send_count(), 0);
}

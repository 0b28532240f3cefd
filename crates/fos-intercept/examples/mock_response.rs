//! Example: mocking XMLHttpRequest responses
//!
//! Run with `RUST_LOG=fos_intercept=debug` to see the controller's decisions.

use fos_intercept::{
    Decision, Event, EventKind, InterceptConfig, Interceptor, Request, RequestId, Response,
    Transport, XmlHttpRequest,
};
use std::rc::Rc;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let handler = |request: Request, id: RequestId| async move {
        match request.url().path() {
            "/api/user" => anyhow::Ok(Decision::respond(Response::json(
                &serde_json::json!({ "id": id.as_str(), "name": "Ada" }),
            )?)),
            "/api/down" => anyhow::Ok(Decision::error("service unavailable")),
            _ => anyhow::Ok(Decision::Passthrough),
        }
    };
    let interceptor = Interceptor::new(InterceptConfig::default(), handler);

    println!("fOS Intercept v{}", fos_intercept::VERSION);

    for path in ["/api/user", "/api/down", "/elsewhere"] {
        let xhr = interceptor.wrap(XmlHttpRequest::new());
        xhr.open("GET", path)?;
        for kind in [EventKind::Load, EventKind::Error] {
            xhr.add_event_listener(
                kind,
                Rc::new(move |e: &Event| println!("  {} ({} bytes)", e.kind, e.loaded)),
            );
        }

        println!("GET {}", path);
        smol::block_on(xhr.send(None))?;
        println!("  status {} {:?}", xhr.status(), xhr.response_text()?);
    }

    Ok(())
}

//! Tests for the error handler and late pipeline stages
//!
//! # Test Coverage
//!
//! - ERROR listeners replacing the default error page
//! - A failing ERROR listener (secondary failure) still producing a page
//! - JSON vs HTML negotiation, debug traces, custom templates
//! - SEND_RESPONSE listeners sending early, unsending and failing

mod common;

use common::{debug_kernel, kernel, text};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use stick_dispatch::kernel::{ErrorEvent, SendResponseEvent};
use stick_dispatch::server::{BufferSink, Request, Response};
use stick_dispatch::{Controller, DispatchError, Kernel, KernelConfig};

#[test]
fn test_error_listener_response_is_used_verbatim() {
    let kernel = kernel();
    kernel.on::<ErrorEvent, _>(0, |event| {
        let body = format!("custom {}", event.code());
        event.set_response(Response::text(event.code(), body));
        Ok(())
    });

    let response = kernel.mock("GET /missing");
    assert_eq!(response.status, 404);
    assert_eq!(response.body_str(), "custom 404");
}

#[test]
fn test_failing_error_listener_falls_back_to_default_page() {
    let kernel = kernel();
    kernel
        .route(
            "GET /fail",
            Controller::new("fail", Vec::new(), |_| Err(anyhow::anyhow!("boom"))),
        )
        .unwrap();
    kernel.on::<ErrorEvent, _>(0, |_| anyhow::bail!("listener broke"));

    let response = kernel.mock("GET /fail");
    assert_eq!(response.status, 500);
    assert!(response.body_str().contains("boom"));
    assert!(response.body_str().contains("Internal Server Error"));
}

#[test]
fn test_secondary_failure_shows_in_debug_trace() {
    let kernel = debug_kernel();
    kernel
        .route(
            "GET /fail",
            Controller::new("fail", Vec::new(), |_| Err(anyhow::anyhow!("boom"))),
        )
        .unwrap();
    kernel.on::<ErrorEvent, _>(0, |_| anyhow::bail!("listener broke"));

    let response = kernel.mock("GET /fail [ajax]");
    assert_eq!(response.status, 500);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    let trace: Vec<String> = serde_json::from_value(body["trace"].clone()).unwrap();
    assert!(trace.iter().any(|line| line.contains("listener broke")));
}

#[test]
fn test_json_errors_for_clients_preferring_json() {
    let kernel = kernel();
    let response = kernel.mock_with("GET /missing", None, &[], &[("Accept", "application/json")]);
    assert_eq!(response.status, 404);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["code"], 404);
    assert_eq!(body["status"], "Not Found");
    assert!(body.get("trace").is_none());
}

#[test]
fn test_explicit_http_error_from_controller() {
    let kernel = kernel();
    kernel
        .route(
            "GET /teapot",
            Controller::new("teapot", Vec::new(), |_| {
                Err(DispatchError::http(418, "short and stout").into())
            }),
        )
        .unwrap();

    let response = kernel.mock("GET /teapot");
    assert_eq!(response.status, 418);
    assert!(response.body_str().contains("short and stout"));
}

#[test]
fn test_custom_error_template() {
    let mut file = tempfile::Builder::new().suffix(".html").tempfile().unwrap();
    write!(file, "<p>{{{{ code }}}}: {{{{ message }}}}</p>").unwrap();

    let kernel = Kernel::new(KernelConfig {
        error_template: Some(file.path().to_path_buf()),
        ..KernelConfig::default()
    });
    let response = kernel.mock("GET /missing");
    assert_eq!(response.body_str(), "<p>404: Not Found</p>");
}

#[test]
fn test_handle_error_outside_pipeline() {
    let kernel = kernel();
    let ctx = stick_dispatch::kernel::RequestContext::new(Request::get("/x"));
    let ctx = kernel.handle_error(ctx, DispatchError::http(503, ""));
    let response = ctx.response.unwrap();
    assert_eq!(response.status, 503);
    assert!(response.body_str().contains("Service Unavailable"));
}

#[test]
fn test_send_listener_sends_early_once() {
    let sink = Arc::new(BufferSink::new());
    let kernel = kernel().with_sink(sink.clone());
    kernel.route("GET /", text("home", "home")).unwrap();
    kernel.on::<SendResponseEvent, _>(10, |event| {
        event.send()?;
        assert!(event.is_sent());
        event.unsend();
        assert!(!event.is_sent());
        assert!(event.is_emitted());
        // a second send must not write again
        event.send()
    });

    let response = kernel.handle(Request::get("/"));
    assert_eq!(response.body_str(), "home");
    assert_eq!(sink.responses().len(), 1);
    assert_eq!(sink.output_string(), "home");
}

#[test]
fn test_send_listener_failure_after_emission() {
    let sink = Arc::new(BufferSink::new());
    let kernel = debug_kernel().with_sink(sink.clone());
    kernel.route("GET /", text("home", "home")).unwrap();
    kernel.on::<SendResponseEvent, _>(0, |event| {
        event.send()?;
        anyhow::bail!("late failure")
    });

    let response = kernel.handle(Request::get("/"));
    assert_eq!(response.status, 200);
    assert!(response.body_str().contains("late failure"));
    // emitted bytes are not rewritten
    assert_eq!(sink.output_string(), "home");
    assert_eq!(sink.responses().len(), 1);
}

#[test]
fn test_quiet_mode_emits_headers_only() {
    let sink = Arc::new(BufferSink::new());
    let kernel = Kernel::new(KernelConfig {
        quiet: true,
        ..KernelConfig::default()
    })
    .with_sink(sink.clone());
    kernel.route("GET /", text("home", "home")).unwrap();

    let response = kernel.handle(Request::get("/"));
    assert_eq!(response.body_str(), "home");
    assert!(sink.output().is_empty());
}

#[test]
fn test_bad_mock_expression_is_400() {
    let kernel = kernel();
    assert_eq!(kernel.mock("nonsense").status, 400);
    assert_eq!(kernel.mock("GET nobody(id=1)").status, 404);
}

#[test]
fn test_unknown_mock_mode_is_400() {
    let kernel = kernel();
    kernel.route("GET /x", text("x", "x")).unwrap();
    let response = kernel.mock("GET /x [bogus]");
    assert_eq!(response.status, 400);
    assert!(response.body_str().contains("bogus"));
    assert_eq!(kernel.mock("GET /x [sync]").status, 200);
}

//! Tests for the staged dispatch pipeline
//!
//! # Test Coverage
//!
//! - Full dispatch through `mock` and `handle`, including argument coercion
//! - Short-circuiting at REQUEST while FINISH_REQUEST and SEND_RESPONSE still fire
//! - One-shot listeners across dispatches
//! - 404 / 405 answers, HEAD handling, service injection
//! - Controller failures and panics turned into error responses
//! - Listeners rewriting the route, arguments, output and final headers

mod common;

use common::{hello, kernel, text, TestTracing};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use stick_dispatch::controller::ParamKind;
use stick_dispatch::kernel::{
    ControllerArgumentsEvent, ControllerEvent, FinishRequestEvent, RequestEvent, ResponseEvent,
    RouteEvent, SendResponseEvent,
};
use stick_dispatch::server::{BufferSink, Request, Response};
use stick_dispatch::{Controller, Kernel, KernelConfig, Output, ParamSpec, RouteOptions};

fn record<E: stick_dispatch::event::Event>(
    kernel: &Kernel,
    log: &Arc<Mutex<Vec<&'static str>>>,
    label: &'static str,
) {
    let log = Arc::clone(log);
    kernel.on::<E, _>(0, move |_| {
        log.lock().push(label);
        Ok(())
    });
}

#[test]
fn test_mock_dispatches_to_controller() {
    let _tracing = TestTracing::init();
    let kernel = kernel();
    kernel.route("GET /hello/@name", hello()).unwrap();

    let response = kernel.mock("GET /hello/world");
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "Hello world");
    assert_eq!(
        response.header("content-type"),
        Some("text/html; charset=utf-8")
    );
}

#[test]
fn test_stages_fire_in_order() {
    let kernel = kernel();
    kernel.route("GET /", text("home", "home")).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    record::<RequestEvent>(&kernel, &log, "request");
    record::<RouteEvent>(&kernel, &log, "route");
    record::<ControllerEvent>(&kernel, &log, "controller");
    record::<ControllerArgumentsEvent>(&kernel, &log, "arguments");
    record::<ResponseEvent>(&kernel, &log, "response");
    record::<FinishRequestEvent>(&kernel, &log, "finish");
    record::<SendResponseEvent>(&kernel, &log, "send");

    let response = kernel.mock("GET /");
    assert_eq!(response.body_str(), "home");
    assert_eq!(
        *log.lock(),
        vec!["request", "route", "controller", "arguments", "response", "finish", "send"]
    );
}

#[test]
fn test_digit_parameter_is_coerced_to_int() {
    let kernel = kernel();
    kernel
        .route(
            "GET /post/@id:digit",
            Controller::new("show", vec![ParamSpec::int("id")], |inv| {
                Ok(Output::Value(json!({ "id": inv.args.value(0).cloned() })))
            }),
        )
        .unwrap();

    let response = kernel.mock("GET /post/1");
    assert_eq!(response.status, 200);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({ "id": 1 }));

    let response = kernel.mock("GET /post/abc");
    assert_eq!(response.status, 404);
}

#[test]
fn test_request_short_circuit_still_finishes_and_sends() {
    let kernel = kernel();
    let invoked = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&invoked);
    kernel
        .route(
            "GET /secret",
            Controller::new("secret", Vec::new(), move |_| {
                *flag.lock() = true;
                Ok("secret".into())
            }),
        )
        .unwrap();

    kernel.on::<RequestEvent, _>(0, |event| {
        event.set_response(Response::text(403, "forbidden"));
        Ok(())
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    record::<RouteEvent>(&kernel, &log, "route");
    record::<FinishRequestEvent>(&kernel, &log, "finish");
    record::<SendResponseEvent>(&kernel, &log, "send");

    let response = kernel.mock("GET /secret");
    assert_eq!(response.status, 403);
    assert_eq!(response.body_str(), "forbidden");
    assert!(!*invoked.lock());
    assert_eq!(*log.lock(), vec!["finish", "send"]);
}

#[test]
fn test_one_shot_listener_fires_once_across_dispatches() {
    let kernel = kernel();
    kernel.route("GET /", text("home", "home")).unwrap();
    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    kernel.one::<RequestEvent, _>(0, move |_| {
        *counter.lock() += 1;
        Ok(())
    });

    kernel.mock("GET /");
    kernel.mock("GET /");
    assert_eq!(*count.lock(), 1);
    assert!(!kernel.events().has_listeners::<RequestEvent>());
}

#[test]
fn test_method_not_allowed_lists_allowed_verbs() {
    let kernel = kernel();
    kernel.route("GET|POST /contact", text("contact", "ok")).unwrap();

    let response = kernel.mock("DELETE /contact");
    assert_eq!(response.status, 405);
    let allow = response.header("allow").unwrap();
    assert!(allow.contains("GET"));
    assert!(allow.contains("POST"));

    let response = kernel.mock("GET /nowhere");
    assert_eq!(response.status, 404);
    assert!(response.header("allow").is_none());
}

#[test]
fn test_controller_error_becomes_500_with_message() {
    let kernel = kernel();
    kernel
        .route(
            "GET /fail",
            Controller::new("fail", Vec::new(), |_| Err(anyhow::anyhow!("boom"))),
        )
        .unwrap();

    let response = kernel.mock("GET /fail");
    assert_eq!(response.status, 500);
    assert!(response.body_str().contains("boom"));
}

#[test]
fn test_controller_panic_becomes_500() {
    let kernel = kernel();
    kernel
        .route(
            "GET /panic",
            Controller::new("panic", Vec::new(), |_| panic!("kaboom")),
        )
        .unwrap();

    let response = kernel.mock("GET /panic [ajax]");
    assert_eq!(response.status, 500);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["code"], 500);
    assert!(body["message"].as_str().unwrap().contains("kaboom"));
}

#[test]
fn test_missing_argument_is_500() {
    let kernel = kernel();
    kernel
        .route(
            "GET /search",
            Controller::new("search", vec![ParamSpec::string("q")], |inv| {
                Ok(inv.args.str(0).unwrap_or_default().to_string().into())
            }),
        )
        .unwrap();

    assert_eq!(kernel.mock("GET /search?q=rust").body_str(), "rust");
    let response = kernel.mock("GET /search");
    assert_eq!(response.status, 500);
    assert!(response.body_str().contains("insufficient arguments"));
}

#[test]
fn test_hide_errors_masks_controller_messages() {
    let kernel = Kernel::new(KernelConfig {
        hide_errors: true,
        ..KernelConfig::default()
    });
    kernel
        .route(
            "GET /fail",
            Controller::new("fail", Vec::new(), |_| Err(anyhow::anyhow!("db password wrong"))),
        )
        .unwrap();

    let response = kernel.mock("GET /fail [ajax]");
    assert_eq!(response.status, 500);
    assert!(!response.body_str().contains("password"));
}

#[test]
fn test_head_request_uses_get_route_and_sends_headers_only() {
    let sink = Arc::new(BufferSink::new());
    let kernel = kernel().with_sink(sink.clone());
    kernel.route("GET /page", text("page", "content")).unwrap();

    let response = kernel.handle(Request::new(http::Method::HEAD, "/page"));
    assert_eq!(response.status, 200);
    assert!(sink.output().is_empty());
    assert_eq!(sink.responses().len(), 1);

    kernel.handle(Request::get("/page"));
    assert_eq!(sink.output_string(), "content");
}

#[test]
fn test_services_and_kernel_are_injected() {
    struct Greeter {
        greeting: &'static str,
    }

    let kernel = kernel();
    kernel.service(Greeter { greeting: "Howdy" });
    kernel
        .route(
            "GET greet /greet/@name",
            Controller::new(
                "greet",
                vec![
                    ParamSpec::service::<Greeter>("greeter"),
                    ParamSpec::kernel("kernel"),
                    ParamSpec::string("name"),
                ],
                |inv| {
                    let greeter = inv
                        .args
                        .service::<Greeter>(0)
                        .ok_or_else(|| anyhow::anyhow!("no greeter"))?;
                    let name = inv.args.str(2).unwrap_or_default();
                    let link = inv
                        .kernel
                        .url("greet", &[("name".to_string(), json!(name))])?;
                    Ok(format!("{} {name} ({link})", greeter.greeting).into())
                },
            ),
        )
        .unwrap();

    let response = kernel.mock("GET greet(name=ann)");
    assert_eq!(response.body_str(), "Howdy ann (/greet/ann)");
    assert!(matches!(ParamSpec::kernel("k").kind, ParamKind::Kernel));
}

#[test]
fn test_controller_listener_swaps_controller() {
    let kernel = kernel();
    kernel.controller("Admin->index", text("admin", "admin"));
    kernel.controller("Maintenance->show", text("maintenance", "down"));
    kernel
        .route("GET /admin", "Admin->index")
        .unwrap();
    kernel.on::<ControllerEvent, _>(0, |event| {
        event.set_controller("Maintenance->show");
        Ok(())
    });

    assert_eq!(kernel.mock("GET /admin").body_str(), "down");
}

#[test]
fn test_unregistered_controller_is_404() {
    let kernel = kernel();
    kernel.route("GET /ghost", "Ghost->show").unwrap();
    assert_eq!(kernel.mock("GET /ghost").status, 404);
}

#[test]
fn test_route_check_and_mode() {
    let kernel = kernel();
    kernel
        .route_with(
            "GET /beta",
            text("beta", "beta"),
            RouteOptions::default().with_check(|req| req.header("x-beta").is_some()),
        )
        .unwrap();
    kernel.route("GET /api [ajax]", text("api", "api")).unwrap();

    assert_eq!(kernel.mock("GET /beta").status, 404);
    let response = kernel.mock_with("GET /beta", None, &[], &[("X-Beta", "1")]);
    assert_eq!(response.body_str(), "beta");

    assert_eq!(kernel.mock("GET /api").status, 404);
    assert_eq!(kernel.mock("GET /api [ajax]").body_str(), "api");
}

#[test]
fn test_json_body_feeds_arguments() {
    let kernel = kernel();
    kernel
        .route(
            "POST /items",
            Controller::new(
                "create",
                vec![ParamSpec::string("title"), ParamSpec::int("qty").with_default(json!(1))],
                |inv| Ok(Output::Value(inv.args.to_json())),
            ),
        )
        .unwrap();

    let response = kernel.mock_with("POST /items", Some(r#"{"title":"pen","qty":"3"}"#), &[], &[]);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!(["pen", 3]));
}

#[test]
fn test_redirect_to_alias() {
    let kernel = kernel();
    kernel.route("GET profile /users/@id", text("profile", "me")).unwrap();
    kernel.redirect("GET /u/@id", "profile", false).unwrap();

    let response = kernel.mock("GET /u/5");
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/users/5"));
}

#[test]
fn test_powered_by_header() {
    let kernel = Kernel::new(KernelConfig {
        powered_by: Some("stick".into()),
        ..KernelConfig::default()
    });
    kernel.route("GET /", text("home", "home")).unwrap();
    assert_eq!(kernel.mock("GET /").header("x-powered-by"), Some("stick"));
}

#[test]
fn test_route_listener_can_swap_the_route() {
    let kernel = kernel();
    kernel.route("GET /old", text("old", "old page")).unwrap();
    kernel.route("GET /new", text("new", "new page")).unwrap();
    let replacement = kernel
        .router()
        .resolve("/new", &http::Method::GET)
        .unwrap();
    kernel.on::<RouteEvent, _>(0, move |event| {
        if event.request().path == "/old" {
            event.set_route(replacement.clone());
        }
        Ok(())
    });

    let response = kernel.mock("GET /old");
    assert_eq!(response.body_str(), "new page");
    assert_eq!(kernel.mock("GET /new").body_str(), "new page");
}

#[test]
fn test_route_listener_can_swap_the_controller_or_answer() {
    let kernel = kernel();
    kernel.controller("Beta->index", text("beta", "beta"));
    kernel.route("GET /app", text("app", "stable")).unwrap();
    kernel.route("GET /closed", text("closed", "open")).unwrap();
    kernel.on::<RouteEvent, _>(0, |event| {
        let path = event.request().path.clone();
        let beta = event.request().header("x-beta").is_some();
        match path.as_str() {
            "/app" if beta => event.set_controller("Beta->index"),
            "/closed" => event.set_response(Response::text(410, "gone")),
            _ => {}
        }
        Ok(())
    });

    assert_eq!(kernel.mock("GET /app").body_str(), "stable");
    let response = kernel.handle(Request::get("/app").with_header("X-Beta", "1"));
    assert_eq!(response.body_str(), "beta");
    let response = kernel.mock("GET /closed");
    assert_eq!(response.status, 410);
    assert_eq!(response.body_str(), "gone");
}

#[test]
fn test_arguments_listener_replaces_argument_list() {
    let kernel = kernel();
    kernel.route("GET /hello/@name", hello()).unwrap();
    kernel.on::<ControllerArgumentsEvent, _>(0, |event| {
        let mut arguments = stick_dispatch::resolver::Arguments::new();
        arguments.push("name", stick_dispatch::resolver::Argument::Value(json!("admin")));
        event.set_arguments(arguments);
        Ok(())
    });

    assert_eq!(kernel.mock("GET /hello/guest").body_str(), "Hello admin");
}

#[test]
fn test_response_listener_transforms_output() {
    let kernel = kernel();
    kernel.route("GET /shout", text("shout", "quiet")).unwrap();
    kernel.route("GET /wrapped", text("wrapped", "inner")).unwrap();
    kernel.on::<ResponseEvent, _>(0, |event| {
        if event.request().path == "/shout" {
            let loud = match event.output() {
                Some(Output::Value(Value::String(s))) => s.to_uppercase(),
                _ => String::new(),
            };
            event.set_output(Output::from(loud));
        } else {
            event.set_response(Response::text(202, "replaced"));
        }
        Ok(())
    });

    assert_eq!(kernel.mock("GET /shout").body_str(), "QUIET");
    let response = kernel.mock("GET /wrapped");
    assert_eq!(response.status, 202);
    assert_eq!(response.body_str(), "replaced");
}

#[test]
fn test_finish_listener_mutates_headers() {
    let sink = Arc::new(BufferSink::new());
    let kernel = kernel().with_sink(sink.clone());
    kernel.route("GET /", text("home", "home")).unwrap();
    kernel.on::<FinishRequestEvent, _>(0, |event| {
        event.response_mut().set_header("Cache-Control", "no-store");
        Ok(())
    });

    let response = kernel.handle(Request::get("/"));
    assert_eq!(response.header("cache-control"), Some("no-store"));
    assert!(sink
        .output_string()
        .to_ascii_lowercase()
        .contains("cache-control: no-store"));
}

#[test]
fn test_finish_listener_error_is_recorded_and_send_continues() {
    let kernel = kernel();
    kernel.route("GET /", text("home", "home")).unwrap();
    kernel.on::<FinishRequestEvent, _>(0, |_| anyhow::bail!("audit log down"));
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&recorded);
    kernel.on::<SendResponseEvent, _>(0, move |event| {
        seen.lock().extend(event.context().errors.iter().cloned());
        Ok(())
    });

    let response = kernel.mock("GET /");
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "home");
    assert_eq!(*recorded.lock(), vec!["audit log down".to_string()]);
}

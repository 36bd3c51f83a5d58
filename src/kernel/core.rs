//! Kernel core module - the staged request pipeline.
//!
//! A dispatch runs REQUEST, ROUTE, CONTROLLER, CONTROLLER_ARGUMENTS, INVOKE
//! and RESPONSE in order. Each stage returns a [`StageOutcome`]:
//!
//! - `Continue` moves to the next stage
//! - `ShortCircuit` means a listener answered, so the remaining stages are
//!   skipped
//! - `Fail` hands the error to the error handler
//!
//! FINISH_REQUEST and SEND_RESPONSE run for every request, whatever the
//! outcome. Controller panics are caught at INVOKE and answered as 500.
//!
//! The route table lives behind an [`ArcSwap`]. Setup methods publish a new
//! snapshot under a write lock; a dispatch loads one snapshot up front and
//! keeps it until the response is sent.

use arc_swap::ArcSwap;
use http::Method;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use super::context::{RequestContext, Stage};
use super::error::DEFAULT_ERROR_TEMPLATE;
use super::events::{
    ControllerArgumentsEvent, ControllerEvent, FinishRequestEvent, RequestEvent, ResponseEvent,
    RouteEvent, SendResponseEvent,
};
use super::render::{DefaultRenderer, ResponseRenderer};
use crate::config::KernelConfig;
use crate::container::ServiceContainer;
use crate::controller::{Controller, ControllerRef, ControllerRegistry, Invocation};
use crate::error::{DispatchError, RouteParseError};
use crate::event::{Event, EventDispatcher, ListenerId};
use crate::resolver::resolve_arguments;
use crate::router::{Route, RouteOptions, Router};
use crate::server::{BufferSink, NullSink, Request, RequestMode, Response, ResponseSink};

/// `METHOD target [mode]`, where target is a path or `alias(k=v,...)`
static MOCK_EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*([A-Za-z]+)\s+(.+?)\s*(?:\[(\w+)\])?\s*$").expect("mock expression regex")
});

static MOCK_ALIAS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^([A-Za-z_][\w.\-]*)\s*(?:\((.*)\))?\s*(\?.*)?$").expect("mock alias regex")
});

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// Go on with the next stage
    Continue(RequestContext),
    /// A response is set, jump to FINISH_REQUEST
    ShortCircuit(RequestContext),
    /// Hand the error to the error handler, then FINISH_REQUEST
    Fail(RequestContext, DispatchError),
}

macro_rules! next_stage {
    ($outcome:expr) => {
        match $outcome {
            StageOutcome::Continue(ctx) => ctx,
            other => return other,
        }
    };
}

/// The dispatcher: route table, listeners, services and controllers, plus
/// the staged pipeline that runs a request through them.
///
/// Setup methods take `&self` and are meant for the bootstrap phase. Each
/// dispatch works on the route table snapshot taken when it starts.
pub struct Kernel {
    router: ArcSwap<Router>,
    router_write: Mutex<()>,
    events: EventDispatcher,
    services: ServiceContainer,
    controllers: RwLock<ControllerRegistry>,
    config: KernelConfig,
    error_template: String,
    renderer: Arc<dyn ResponseRenderer>,
    sink: Arc<dyn ResponseSink>,
}

impl Kernel {
    /// Create an empty kernel.
    ///
    /// A custom error template that cannot be read is logged and replaced
    /// by the built-in page. Responses go to a [`NullSink`] until
    /// [`with_sink`](Self::with_sink) is called.
    #[must_use]
    pub fn new(config: KernelConfig) -> Self {
        let error_template = match &config.error_template {
            Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Error template not readable, using default");
                DEFAULT_ERROR_TEMPLATE.to_string()
            }),
            None => DEFAULT_ERROR_TEMPLATE.to_string(),
        };
        Self {
            router: ArcSwap::from_pointee(Router::new()),
            router_write: Mutex::new(()),
            events: EventDispatcher::new(),
            services: ServiceContainer::new(),
            controllers: RwLock::new(ControllerRegistry::new()),
            config,
            error_template,
            renderer: Arc::new(DefaultRenderer),
            sink: Arc::new(NullSink),
        }
    }

    /// Build a kernel and register the routes listed in `config`.
    pub fn from_config(config: KernelConfig) -> Result<Self, RouteParseError> {
        let kernel = Self::new(config);
        let config = kernel.config.clone();
        kernel.load_config(&config)?;
        Ok(kernel)
    }

    /// Emit responses through `sink` instead of discarding them.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the RESPONSE stage rendering of controller output.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ResponseRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Register the routes, redirects and resources of a config.
    pub fn load_config(&self, config: &KernelConfig) -> Result<(), RouteParseError> {
        for entry in &config.routes {
            self.route_with(
                &entry.route,
                ControllerRef::parse(&entry.controller),
                RouteOptions::priority(entry.priority),
            )?;
        }
        for entry in &config.rest {
            self.rest(&entry.route, &entry.controller)?;
        }
        for entry in &config.redirects {
            self.redirect(&entry.route, &entry.to, entry.permanent)?;
        }
        info!(
            routes = config.routes.len(),
            rest = config.rest.len(),
            redirects = config.redirects.len(),
            "Config routes loaded"
        );
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Listener registry shared by every dispatch.
    #[must_use]
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Services injected into controller parameters by type.
    #[must_use]
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// Current route table snapshot.
    #[must_use]
    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    pub(crate) fn error_template(&self) -> &str {
        &self.error_template
    }

    fn update_router<T>(
        &self,
        f: impl FnOnce(&mut Router) -> Result<T, RouteParseError>,
    ) -> Result<T, RouteParseError> {
        let _guard = self.router_write.lock();
        let mut next = Router::clone(&self.router.load());
        let result = f(&mut next)?;
        self.router.store(Arc::new(next));
        Ok(result)
    }

    /// Register a route expression such as `"GET post /posts/@id:digit"`.
    ///
    /// `controller` may be a [`Controller`] or a string reference resolved
    /// at dispatch time.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteParseError`] when the expression is malformed or
    /// reuses an unknown alias without a path. The route table is left
    /// unchanged.
    pub fn route(
        &self,
        pattern: &str,
        controller: impl Into<ControllerRef>,
    ) -> Result<Arc<Route>, RouteParseError> {
        self.route_with(pattern, controller, RouteOptions::default())
    }

    /// Like [`route`](Self::route), with a priority or a guard.
    pub fn route_with(
        &self,
        pattern: &str,
        controller: impl Into<ControllerRef>,
        options: RouteOptions,
    ) -> Result<Arc<Route>, RouteParseError> {
        let controller = controller.into();
        self.update_router(|router| router.add_route(pattern, controller, options))
    }

    /// Resource routes, see [`Router::rest`].
    pub fn rest(&self, expr: &str, controller: &str) -> Result<Vec<Arc<Route>>, RouteParseError> {
        self.update_router(|router| router.rest(expr, controller))
    }

    /// Register a route answering with a redirect to `target`.
    ///
    /// `target` is an alias or a URL; aliases are resolved per request so
    /// they may be registered later. `permanent` selects 301 over 302.
    pub fn redirect(
        &self,
        expr: &str,
        target: &str,
        permanent: bool,
    ) -> Result<Arc<Route>, RouteParseError> {
        self.update_router(|router| router.redirect(expr, target, permanent))
    }

    /// Register a controller under a string reference such as `"Blog->show"`.
    pub fn controller(&self, name: &str, controller: Controller) {
        self.controllers.write().register(name, controller);
    }

    /// Controller used for string references nobody registered.
    pub fn fallback_controller(&self, controller: Controller) {
        self.controllers.write().set_fallback(controller);
    }

    /// Register a service instance, replacing any previous one of type `T`.
    pub fn service<T: Any + Send + Sync>(&self, instance: T) {
        self.services.register(instance);
    }

    /// Listen to event `E`. Higher priorities run first; equal priorities
    /// run in registration order.
    pub fn on<E, F>(&self, priority: i32, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(priority, listener)
    }

    /// Like [`on`](Self::on), but the listener is removed once it has run.
    pub fn one<E, F>(&self, priority: i32, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.one(priority, listener)
    }

    /// Remove every listener of event `E`.
    pub fn off<E: Event>(&self) {
        self.events.off::<E>();
    }

    /// Build a URL for an alias, see [`Router::build_url`].
    pub fn url(&self, alias: &str, params: &[(String, Value)]) -> Result<String, DispatchError> {
        self.router.load().build_url(alias, params)
    }

    /// Run a request through the full pipeline and emit it to the
    /// configured sink. Never fails; errors become error responses.
    pub fn handle(&self, request: Request) -> Response {
        self.dispatch(RequestContext::new(request), Arc::clone(&self.sink), None)
    }

    /// [`handle`](Self::handle) without the returned response.
    pub fn run(&self, request: Request) {
        let _response = self.handle(request);
    }

    /// Simulate a request from an expression such as `"GET /blog?page=2"`,
    /// `"POST post_item(id=3)"` or `"GET /ping [ajax]"`.
    pub fn mock(&self, expr: &str) -> Response {
        self.mock_with(expr, None, &[], &[])
    }

    /// [`mock`](Self::mock) with a body, server variables and headers.
    ///
    /// The output goes to a fresh [`BufferSink`], not the configured sink.
    /// An unparsable expression or unknown alias is answered through the
    /// error handler like any other failure.
    pub fn mock_with(
        &self,
        expr: &str,
        body: Option<&str>,
        server: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Response {
        let (request, failure) = match self.mock_request(expr) {
            Ok(request) => (request, None),
            Err((request, err)) => (request, Some(err)),
        };
        let mut request = request;
        if let Some(body) = body {
            request = request.with_raw_body(body.as_bytes().to_vec());
        }
        for (key, value) in server {
            request = request.with_server(key, *value);
        }
        for (name, value) in headers {
            request = request.with_header(name, *value);
        }

        let sink: Arc<dyn ResponseSink> = Arc::new(BufferSink::new());
        self.dispatch(RequestContext::new(request), sink, failure)
    }

    fn mock_request(&self, expr: &str) -> Result<Request, (Request, DispatchError)> {
        let Some(caps) = MOCK_EXPRESSION.captures(expr) else {
            return Err((
                Request::get(expr.trim()),
                DispatchError::http(400, format!("invalid mock expression '{expr}'")),
            ));
        };
        let verb = caps.get(1).map_or("GET", |m| m.as_str()).to_ascii_uppercase();
        let method = Method::from_bytes(verb.as_bytes()).unwrap_or(Method::GET);
        let target = caps.get(2).map_or("/", |m| m.as_str());
        let mode = match caps.get(3) {
            None => None,
            Some(m) => match RequestMode::parse(m.as_str()) {
                Some(mode) => Some(mode),
                None => {
                    let path = if target.starts_with('/') { target } else { "/" };
                    return Err((
                        Request::new(method, path),
                        DispatchError::http(400, format!("unknown mode '{}'", m.as_str())),
                    ))
                }
            },
        };

        let url = if target.starts_with('/') {
            Ok(target.to_string())
        } else {
            self.mock_alias_url(target)
        };
        let (request, failure) = match url {
            Ok(url) => (Request::new(method, &url), None),
            Err(err) => (Request::new(method, "/"), Some(err)),
        };
        let request = match mode {
            Some(RequestMode::Ajax) => request.with_header("X-Requested-With", "XMLHttpRequest"),
            Some(RequestMode::Cli) => request.with_cli(true),
            _ => request,
        };
        match failure {
            None => Ok(request),
            Some(err) => Err((request, err)),
        }
    }

    fn mock_alias_url(&self, target: &str) -> Result<String, DispatchError> {
        let caps = MOCK_ALIAS
            .captures(target)
            .ok_or_else(|| DispatchError::UnknownAlias {
                alias: target.to_string(),
            })?;
        let alias = caps.get(1).map_or("", |m| m.as_str());
        let params: Vec<(String, Value)> = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim().to_string(), Value::String(v.trim().to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let mut url = self.url(alias, &params)?;
        if let Some(query) = caps.get(3) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(query.as_str().trim_start_matches('?'));
        }
        Ok(url)
    }

    fn dispatch(
        &self,
        ctx: RequestContext,
        sink: Arc<dyn ResponseSink>,
        failure: Option<DispatchError>,
    ) -> Response {
        let span = info_span!(
            "dispatch",
            request_id = %ctx.request_id,
            method = %ctx.request.method,
            path = %ctx.request.path
        );
        let _enter = span.enter();
        debug!("Dispatch started");

        let outcome = match failure {
            Some(err) => StageOutcome::Fail(ctx, err),
            None => {
                let router = self.router.load_full();
                self.run_stages(ctx, &router)
            }
        };
        let ctx = match outcome {
            StageOutcome::Continue(ctx) => ctx,
            StageOutcome::ShortCircuit(ctx) => {
                debug!(stage = %ctx.stage, "Pipeline short-circuited");
                ctx
            }
            StageOutcome::Fail(ctx, err) => self.handle_error(ctx, err),
        };

        let (ctx, response) = self.finish_request(ctx);
        self.send_response(ctx, response, sink)
    }

    fn run_stages(&self, ctx: RequestContext, router: &Router) -> StageOutcome {
        let ctx = next_stage!(self.request_stage(ctx));
        let ctx = next_stage!(self.route_stage(ctx, router));
        let ctx = next_stage!(self.controller_stage(ctx));
        let ctx = next_stage!(self.arguments_stage(ctx));
        let ctx = next_stage!(self.invoke_stage(ctx));
        self.response_stage(ctx)
    }

    /// Dispatch a stage event and read the outcome off the context.
    fn fire<E: Event>(&self, mut event: E, into_context: fn(E) -> RequestContext) -> StageOutcome {
        let result = self.events.dispatch(&mut event);
        let ctx = into_context(event);
        match result {
            Err(e) => StageOutcome::Fail(ctx, DispatchError::from_anyhow(e)),
            Ok(()) if ctx.response.is_some() => StageOutcome::ShortCircuit(ctx),
            Ok(()) => StageOutcome::Continue(ctx),
        }
    }

    fn request_stage(&self, mut ctx: RequestContext) -> StageOutcome {
        ctx.stage = Stage::Request;
        self.fire(RequestEvent::new(ctx), RequestEvent::into_context)
    }

    fn route_stage(&self, mut ctx: RequestContext, router: &Router) -> StageOutcome {
        ctx.stage = Stage::Route;
        let mut matches = router.resolve_request(&ctx.request);
        if matches.is_empty() {
            let method = ctx.request.method.as_str().to_string();
            let path = ctx.request.path.clone();
            let allowed = router.allowed_methods(&path);
            // a route accepting the verb exists but its mode or guard refused
            let err = if allowed.is_empty() || allowed.contains(&method) {
                DispatchError::NoRouteMatched { method, path }
            } else {
                DispatchError::MethodNotAllowed {
                    method,
                    path,
                    allowed,
                }
            };
            return StageOutcome::Fail(ctx, err);
        }

        let chosen = matches.remove(0);
        debug!(
            route = %chosen.route,
            controller = %chosen.route.controller,
            candidates = matches.len(),
            "Route selected"
        );
        ctx.controller = Some(chosen.route.controller.clone());
        ctx.route = Some(chosen);
        ctx.candidates = matches;
        self.fire(RouteEvent::new(ctx), RouteEvent::into_context)
    }

    fn controller_stage(&self, mut ctx: RequestContext) -> StageOutcome {
        ctx.stage = Stage::Controller;
        let mut ctx = next_stage!(self.fire(ControllerEvent::new(ctx), ControllerEvent::into_context));

        let resolved = ctx
            .controller
            .as_ref()
            .and_then(|reference| self.controllers.read().resolve(reference));
        match resolved {
            Some(controller) => {
                debug!(controller = %controller.name, "Controller resolved");
                ctx.resolved = Some(controller);
                StageOutcome::Continue(ctx)
            }
            None => {
                let controller = ctx
                    .controller
                    .as_ref()
                    .map_or_else(|| "<none>".to_string(), ControllerRef::describe);
                StageOutcome::Fail(ctx, DispatchError::UnresolvedController { controller })
            }
        }
    }

    fn arguments_stage(&self, mut ctx: RequestContext) -> StageOutcome {
        ctx.stage = Stage::ControllerArguments;
        let Some(controller) = ctx.resolved.clone() else {
            return StageOutcome::Fail(
                ctx,
                DispatchError::UnresolvedController {
                    controller: "<none>".to_string(),
                },
            );
        };
        let available = ctx.available_values();
        match resolve_arguments(&controller.name, &controller.params, &available, &self.services) {
            Ok(arguments) => {
                ctx.arguments = Some(arguments);
                self.fire(
                    ControllerArgumentsEvent::new(ctx),
                    ControllerArgumentsEvent::into_context,
                )
            }
            Err(err) => StageOutcome::Fail(ctx, err),
        }
    }

    fn invoke_stage(&self, mut ctx: RequestContext) -> StageOutcome {
        ctx.stage = Stage::Invoke;
        let Some(controller) = ctx.resolved.clone() else {
            return StageOutcome::Fail(
                ctx,
                DispatchError::UnresolvedController {
                    controller: "<none>".to_string(),
                },
            );
        };
        let args = ctx.arguments.clone().unwrap_or_default();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            controller.call(Invocation {
                kernel: self,
                context: &ctx,
                args,
            })
        }));

        match result {
            Ok(Ok(output)) => {
                debug!(controller = %controller.name, "Controller returned");
                ctx.output = Some(output);
                StageOutcome::Continue(ctx)
            }
            Ok(Err(e)) => StageOutcome::Fail(ctx, DispatchError::from_anyhow(e)),
            Err(panic) => {
                let panic_message = panic_message(panic.as_ref());
                error!(
                    controller = %controller.name,
                    panic_message = %panic_message,
                    "Controller panicked"
                );
                StageOutcome::Fail(
                    ctx,
                    DispatchError::UnhandledController(anyhow::anyhow!(
                        "controller panicked: {panic_message}"
                    )),
                )
            }
        }
    }

    fn response_stage(&self, mut ctx: RequestContext) -> StageOutcome {
        ctx.stage = Stage::Response;
        let mut ctx = match self.fire(ResponseEvent::new(ctx), ResponseEvent::into_context) {
            StageOutcome::Continue(ctx) | StageOutcome::ShortCircuit(ctx) => ctx,
            fail => return fail,
        };
        if ctx.response.is_none() {
            match self.renderer.render(&ctx.request, ctx.output.clone()) {
                Ok(response) => ctx.response = Some(response),
                Err(e) => return StageOutcome::Fail(ctx, DispatchError::from_anyhow(e)),
            }
        }
        StageOutcome::Continue(ctx)
    }

    fn finish_request(&self, mut ctx: RequestContext) -> (RequestContext, Response) {
        ctx.stage = Stage::FinishRequest;
        let mut response = ctx.response.take().unwrap_or_default();
        if let Some(powered_by) = &self.config.powered_by {
            if response.header("x-powered-by").is_none() {
                response.set_header("X-Powered-By", powered_by.as_str());
            }
        }

        let mut event = FinishRequestEvent::new(ctx, response);
        let result = self.events.dispatch(&mut event);
        let (mut ctx, response) = event.into_parts();
        if let Err(e) = result {
            error!(stage = %ctx.stage, error = %e, "Finish request listener failed");
            ctx.errors.push(e.to_string());
        }
        (ctx, response)
    }

    fn send_response(
        &self,
        mut ctx: RequestContext,
        response: Response,
        sink: Arc<dyn ResponseSink>,
    ) -> Response {
        ctx.stage = Stage::SendResponse;
        let headers_only = self.config.quiet || ctx.request.method == Method::HEAD;

        let mut event = SendResponseEvent::new(ctx, response, Arc::clone(&sink), headers_only);
        let result = self.events.dispatch(&mut event);
        let (mut ctx, mut response, emitted) = event.into_parts();

        if let Err(e) = &result {
            error!(
                stage = %ctx.stage,
                emitted,
                error = %e,
                "Send response listener failed"
            );
            ctx.errors.push(e.to_string());
            if self.config.debug {
                response.body.extend_from_slice(format!("\n{e}").as_bytes());
            }
        }

        if !emitted {
            if let Err(e) = sink.emit(&response, headers_only) {
                error!(error = %e, "Response emission failed");
                ctx.errors.push(e.to_string());
            }
        }

        info!(
            status = response.status,
            route = ?ctx.route.as_ref().map(|m| m.route.pattern.as_str()),
            errors = ctx.errors.len(),
            elapsed_ms = ctx.elapsed_ms() as u64,
            "Request complete"
        );
        response
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("routes", &self.router.load().routes().len())
            .field("events", &self.events)
            .field("services", &self.services)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

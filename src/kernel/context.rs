//! Per-request state carried through the pipeline.
//!
//! Every stage event owns the [`RequestContext`] while its listeners run and
//! hands it back to the kernel afterwards. Values filled by earlier stages
//! (route, controller, arguments, output) stay visible to later ones.

use serde_json::Value;
use std::fmt;
use std::time::Instant;

use crate::controller::{Controller, ControllerRef, Output};
use crate::ids::RequestId;
use crate::resolver::Arguments;
use crate::router::RouteMatch;
use crate::server::{Request, Response};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Request,
    Route,
    Controller,
    ControllerArguments,
    Invoke,
    Response,
    FinishRequest,
    SendResponse,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Route => "route",
            Stage::Controller => "controller",
            Stage::ControllerArguments => "controller_arguments",
            Stage::Invoke => "invoke",
            Stage::Response => "response",
            Stage::FinishRequest => "finish_request",
            Stage::SendResponse => "send_response",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one dispatch. Created per request, owned by the
/// pipeline and lent to each stage's event in turn.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub request: Request,
    pub stage: Stage,
    /// Route chosen at ROUTE
    pub route: Option<RouteMatch>,
    /// Routes that matched but were not chosen, best first
    pub candidates: Vec<RouteMatch>,
    pub controller: Option<ControllerRef>,
    /// Callable the controller reference resolved to
    pub resolved: Option<Controller>,
    pub arguments: Option<Arguments>,
    /// Raw controller result captured at INVOKE
    pub output: Option<Output>,
    pub response: Option<Response>,
    /// Failures recorded along the way (secondary handler errors, late
    /// listener errors)
    pub errors: Vec<String>,
    pub started: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new(request: Request) -> Self {
        let request_id = RequestId::from_header_or_new(request.header("x-request-id"));
        Self {
            request_id,
            request,
            stage: Stage::Request,
            route: None,
            candidates: Vec::new(),
            controller: None,
            resolved: None,
            arguments: None,
            output: None,
            response: None,
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Path parameters of the chosen route.
    #[must_use]
    pub fn route_values(&self) -> Vec<(String, Value)> {
        self.route.as_ref().map(RouteMatch::values).unwrap_or_default()
    }

    /// Named values offered to the argument resolver: path parameters, then
    /// query parameters in key order, then the fields of a JSON object body.
    #[must_use]
    pub fn available_values(&self) -> Vec<(String, Value)> {
        let mut values = self.route_values();
        let mut query: Vec<_> = self.request.query.iter().collect();
        query.sort();
        values.extend(
            query
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
        );
        if let Some(Value::Object(body)) = &self.request.body {
            values.extend(body.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        values
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.as_ref()?.param(name)?.as_str()
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

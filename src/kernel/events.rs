//! Events fired by the kernel, one per pipeline stage plus the error event.
//!
//! Every event owns the [`RequestContext`] while its listeners run. Setting a
//! response on a REQUEST, ROUTE, CONTROLLER or CONTROLLER_ARGUMENTS event
//! skips straight to FINISH_REQUEST.

use std::sync::Arc;

use super::context::RequestContext;
use super::error::ErrorPayload;
use crate::controller::{ControllerRef, Output};
use crate::event::Event;
use crate::resolver::Arguments;
use crate::router::RouteMatch;
use crate::server::{Request, Response, ResponseSink};

macro_rules! kernel_event {
    ($ty:ident, $name:literal) => {
        impl Event for $ty {
            const NAME: &'static str = $name;

            fn is_propagation_stopped(&self) -> bool {
                self.stopped
            }

            fn stop_propagation(&mut self) {
                self.stopped = true;
            }
        }

        impl $ty {
            #[must_use]
            pub fn context(&self) -> &RequestContext {
                &self.context
            }

            pub fn context_mut(&mut self) -> &mut RequestContext {
                &mut self.context
            }

            #[must_use]
            pub fn request(&self) -> &Request {
                &self.context.request
            }

            #[must_use]
            pub fn into_context(self) -> RequestContext {
                self.context
            }
        }
    };
}

macro_rules! short_circuit {
    ($ty:ident) => {
        impl $ty {
            /// Answer the request now, skipping to FINISH_REQUEST.
            pub fn set_response(&mut self, response: Response) {
                self.context.response = Some(response);
            }

            #[must_use]
            pub fn has_response(&self) -> bool {
                self.context.response.is_some()
            }
        }
    };
}

/// Fired before routing.
#[derive(Debug)]
pub struct RequestEvent {
    context: RequestContext,
    stopped: bool,
}

impl RequestEvent {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            context,
            stopped: false,
        }
    }
}

kernel_event!(RequestEvent, "kernel.request");
short_circuit!(RequestEvent);

/// Fired once a route matched.
#[derive(Debug)]
pub struct RouteEvent {
    context: RequestContext,
    stopped: bool,
}

impl RouteEvent {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            context,
            stopped: false,
        }
    }

    #[must_use]
    pub fn route(&self) -> Option<&RouteMatch> {
        self.context.route.as_ref()
    }

    /// Use another route; its controller replaces the current one.
    pub fn set_route(&mut self, route: RouteMatch) {
        self.context.controller = Some(route.route.controller.clone());
        self.context.route = Some(route);
    }

    pub fn set_controller(&mut self, controller: impl Into<ControllerRef>) {
        self.context.controller = Some(controller.into());
    }
}

kernel_event!(RouteEvent, "kernel.route");
short_circuit!(RouteEvent);

/// Fired with the controller reference about to be resolved.
#[derive(Debug)]
pub struct ControllerEvent {
    context: RequestContext,
    stopped: bool,
}

impl ControllerEvent {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            context,
            stopped: false,
        }
    }

    #[must_use]
    pub fn controller(&self) -> Option<&ControllerRef> {
        self.context.controller.as_ref()
    }

    pub fn set_controller(&mut self, controller: impl Into<ControllerRef>) {
        self.context.controller = Some(controller.into());
    }
}

kernel_event!(ControllerEvent, "kernel.controller");
short_circuit!(ControllerEvent);

/// Fired with the resolved argument list.
#[derive(Debug)]
pub struct ControllerArgumentsEvent {
    context: RequestContext,
    stopped: bool,
}

impl ControllerArgumentsEvent {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            context,
            stopped: false,
        }
    }

    #[must_use]
    pub fn arguments(&self) -> Option<&Arguments> {
        self.context.arguments.as_ref()
    }

    /// Replace the argument list wholesale.
    pub fn set_arguments(&mut self, arguments: Arguments) {
        self.context.arguments = Some(arguments);
    }
}

kernel_event!(ControllerArgumentsEvent, "kernel.controller_arguments");
short_circuit!(ControllerArgumentsEvent);

/// Fired with the raw controller result. A listener that sets a response
/// replaces the default rendering.
#[derive(Debug)]
pub struct ResponseEvent {
    context: RequestContext,
    stopped: bool,
}

impl ResponseEvent {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            context,
            stopped: false,
        }
    }

    #[must_use]
    pub fn output(&self) -> Option<&Output> {
        self.context.output.as_ref()
    }

    pub fn set_output(&mut self, output: Output) {
        self.context.output = Some(output);
    }

    pub fn set_response(&mut self, response: Response) {
        self.context.response = Some(response);
    }

    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.context.response.as_ref()
    }
}

kernel_event!(ResponseEvent, "kernel.response");

/// Fired with the final response before anything is sent. Always fires.
#[derive(Debug)]
pub struct FinishRequestEvent {
    context: RequestContext,
    response: Response,
    stopped: bool,
}

impl FinishRequestEvent {
    pub(crate) fn new(context: RequestContext, response: Response) -> Self {
        Self {
            context,
            response,
            stopped: false,
        }
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn into_parts(self) -> (RequestContext, Response) {
        (self.context, self.response)
    }
}

kernel_event!(FinishRequestEvent, "kernel.finish_request");

/// Fired around emission. A listener may [`send`](Self::send) early; the
/// kernel emits afterwards only if nobody did.
pub struct SendResponseEvent {
    context: RequestContext,
    response: Response,
    sink: Arc<dyn ResponseSink>,
    headers_only: bool,
    sent: bool,
    emitted: bool,
    stopped: bool,
}

impl SendResponseEvent {
    pub(crate) fn new(
        context: RequestContext,
        response: Response,
        sink: Arc<dyn ResponseSink>,
        headers_only: bool,
    ) -> Self {
        Self {
            context,
            response,
            sink,
            headers_only,
            sent: false,
            emitted: false,
            stopped: false,
        }
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Changes after emission are not seen by the sink.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    #[must_use]
    pub fn headers_only(&self) -> bool {
        self.headers_only
    }

    /// Emit the response now. Emission happens at most once per dispatch.
    pub fn send(&mut self) -> anyhow::Result<()> {
        if !self.emitted {
            self.sink.emit(&self.response, self.headers_only)?;
            self.emitted = true;
        }
        self.sent = true;
        Ok(())
    }

    /// Clear the sent flag. Bytes already written stay written.
    pub fn unsend(&mut self) {
        self.sent = false;
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    #[must_use]
    pub fn is_emitted(&self) -> bool {
        self.emitted
    }

    pub(crate) fn into_parts(self) -> (RequestContext, Response, bool) {
        (self.context, self.response, self.emitted)
    }
}

impl std::fmt::Debug for SendResponseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendResponseEvent")
            .field("status", &self.response.status)
            .field("headers_only", &self.headers_only)
            .field("sent", &self.sent)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

kernel_event!(SendResponseEvent, "kernel.send_response");

/// Fired by the error handler. A listener response is used verbatim.
#[derive(Debug)]
pub struct ErrorEvent {
    context: RequestContext,
    payload: ErrorPayload,
    response: Option<Response>,
    stopped: bool,
}

impl ErrorEvent {
    pub(crate) fn new(context: RequestContext, payload: ErrorPayload) -> Self {
        Self {
            context,
            payload,
            response: None,
            stopped: false,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &ErrorPayload {
        &self.payload
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.payload.code
    }

    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub(crate) fn into_parts(self) -> (RequestContext, ErrorPayload, Option<Response>) {
        (self.context, self.payload, self.response)
    }
}

kernel_event!(ErrorEvent, "kernel.error");

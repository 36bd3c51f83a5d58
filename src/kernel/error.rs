//! Error handler.
//!
//! Every [`DispatchError`] raised during a dispatch ends up here. The
//! handler builds an [`ErrorPayload`], logs it, gives [`ErrorEvent`]
//! listeners a chance to answer, and otherwise renders a JSON or HTML page.
//! It never fails: a listener error is logged next to the original one and
//! the default page is rendered anyway.

use minijinja::{context, Environment};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::context::RequestContext;
use super::core::Kernel;
use super::events::ErrorEvent;
use crate::error::DispatchError;
use crate::server::{status_reason, Response};

pub(crate) const DEFAULT_ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>{{ code }} {{ status }}</title></head>
<body>
<h1>{{ code }} {{ status }}</h1>
<p>{{ message }}</p>
{%- if trace %}
<pre>{% for line in trace %}{{ line }}
{% endfor %}</pre>
{%- endif %}
</body>
</html>
"#;

/// What the error handler knows about a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// HTTP status, always within 100-599
    pub code: u16,
    pub status_text: String,
    /// Client-facing message; the status text when nothing more specific
    /// may be shown
    pub message: String,
    pub headers: Vec<(String, String)>,
    /// Full description of the underlying error, for logs
    pub origin: Option<String>,
    /// Error chain, outermost first
    pub trace: Vec<String>,
}

impl ErrorPayload {
    /// Payload for an explicit status. Codes outside 100-599 become 500.
    #[must_use]
    pub fn new(code: u16, message: Option<String>) -> Self {
        let code = if (100..=599).contains(&code) { code } else { 500 };
        let status_text = status_reason(code).to_string();
        Self {
            code,
            message: message.unwrap_or_else(|| status_text.clone()),
            status_text,
            headers: Vec::new(),
            origin: None,
            trace: Vec::new(),
        }
    }

    /// Payload for a dispatch error. With `hide_errors`, messages coming
    /// from controller failures are replaced by the status text.
    #[must_use]
    pub fn from_error(err: &DispatchError, hide_errors: bool) -> Self {
        let hidden = hide_errors && is_controller_failure(err);
        let message = if hidden { None } else { err.public_message() };
        let mut payload = Self::new(err.code(), message);
        payload.headers = err.headers();
        payload.origin = Some(err.to_string());
        payload.trace = err.trace();
        payload
    }

    /// Default JSON body: `{code, status, message, trace?}`.
    #[must_use]
    pub fn to_json(&self, with_trace: bool) -> serde_json::Value {
        let mut body = json!({
            "code": self.code,
            "status": self.status_text,
            "message": self.message,
        });
        if with_trace {
            body["trace"] = json!(self.trace);
        }
        body
    }

    /// Default HTML body rendered from `template`, or a plain page when the
    /// template fails.
    #[must_use]
    pub fn to_html(&self, template: &str, with_trace: bool) -> String {
        let mut env = Environment::new();
        let rendered = env
            .add_template("error.html", template)
            .and_then(|()| env.get_template("error.html"))
            .and_then(|tpl| {
                tpl.render(context! {
                    code => self.code,
                    status => &self.status_text,
                    message => &self.message,
                    trace => if with_trace { self.trace.clone() } else { Vec::new() },
                })
            });
        match rendered {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Error template failed, using plain page");
                format!(
                    "<!DOCTYPE html><html><body><h1>{} {}</h1><p>{}</p></body></html>",
                    self.code,
                    self.status_text,
                    escape_html(&self.message)
                )
            }
        }
    }
}

fn is_controller_failure(err: &DispatchError) -> bool {
    match err {
        DispatchError::UnhandledController(inner) => inner.downcast_ref::<DispatchError>().is_none(),
        DispatchError::SecondaryHandler { .. } => true,
        _ => false,
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Kernel {
    /// Turn `err` into the context's response.
    ///
    /// Usable from outside the pipeline to answer a request with an explicit
    /// HTTP error; the result still has to go through FINISH_REQUEST and
    /// SEND_RESPONSE to reach the client.
    pub fn handle_error(&self, ctx: RequestContext, err: DispatchError) -> RequestContext {
        let payload = ErrorPayload::from_error(&err, self.config().hide_errors);

        if payload.code >= 500 {
            error!(
                request_id = %ctx.request_id,
                method = %ctx.request.method,
                path = %ctx.request.path,
                stage = %ctx.stage,
                code = payload.code,
                error = %err,
                trace = ?payload.trace,
                "Request failed"
            );
        } else {
            info!(
                request_id = %ctx.request_id,
                method = %ctx.request.method,
                path = %ctx.request.path,
                stage = %ctx.stage,
                code = payload.code,
                error = %err,
                "Request answered with error"
            );
        }

        let mut event = ErrorEvent::new(ctx, payload);
        let dispatched = self.events().dispatch(&mut event);
        let (mut ctx, mut payload, response) = event.into_parts();

        match dispatched {
            Ok(()) => {
                if let Some(response) = response {
                    ctx.response = Some(response);
                    return ctx;
                }
            }
            Err(secondary) => {
                let secondary = DispatchError::SecondaryHandler {
                    original: err.to_string(),
                    secondary: secondary.to_string(),
                };
                error!(
                    request_id = %ctx.request_id,
                    code = payload.code,
                    error = %secondary,
                    "Error listener failed"
                );
                ctx.errors.push(secondary.to_string());
                payload.trace.push(secondary.to_string());
            }
        }

        ctx.response = Some(self.render_error(&ctx, &payload));
        ctx
    }

    fn render_error(&self, ctx: &RequestContext, payload: &ErrorPayload) -> Response {
        let debug = self.config().debug;
        let mut response = if ctx.request.wants_json() {
            Response::json(payload.code, &payload.to_json(debug))
        } else {
            Response::html(payload.code, payload.to_html(self.error_template(), debug))
        };
        for (name, value) in &payload.headers {
            response.set_header(name, value.as_str());
        }
        response
    }
}

//! Conversion of controller output into a [`Response`].

use serde_json::Value;

use crate::controller::Output;
use crate::server::{Request, Response};

/// Turns a raw controller result into a response at the RESPONSE stage,
/// when no listener produced one.
pub trait ResponseRenderer: Send + Sync {
    fn render(&self, request: &Request, output: Option<Output>) -> anyhow::Result<Response>;
}

/// Responses pass through, strings become HTML, null becomes an empty
/// 200 and any other value is JSON-encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRenderer;

impl ResponseRenderer for DefaultRenderer {
    fn render(&self, _request: &Request, output: Option<Output>) -> anyhow::Result<Response> {
        Ok(match output {
            None | Some(Output::Value(Value::Null)) => Response::empty(200),
            Some(Output::Response(response)) => response,
            Some(Output::Value(Value::String(s))) => Response::html(200, s),
            Some(Output::Value(other)) => Response::json(200, &other),
        })
    }
}

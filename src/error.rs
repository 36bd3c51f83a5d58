//! Error taxonomy for route registration and request dispatch.
//!
//! Two families exist:
//!
//! - [`RouteParseError`] is a configuration-time failure. It is returned from
//!   setup calls (`route`, `rest`, `redirect`, config loading) and is never
//!   produced during a live dispatch.
//! - [`DispatchError`] covers everything that can go wrong while a request is
//!   in flight. The kernel funnels every variant into the error handler,
//!   which converts it to a response, so callers of `handle`/`run`/`mock`
//!   never see one. URL building is the exception: it returns
//!   [`DispatchError::MissingParameter`] / [`DispatchError::UnknownAlias`]
//!   straight to its caller.

use thiserror::Error;

/// A malformed route expression or path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteParseError {
    /// The expression was empty or only whitespace
    #[error("empty route expression")]
    Empty,
    /// A verb is not a valid HTTP method token
    #[error("invalid HTTP method '{method}' in route '{pattern}'")]
    InvalidMethod { pattern: String, method: String },
    /// The expression does not follow `METHODS [alias] [/path] [[mode]]`
    #[error("unable to parse route '{pattern}'")]
    Malformed { pattern: String },
    /// No path was given and the alias is not registered yet
    #[error("route '{pattern}' has no path and alias '{alias}' is not registered")]
    UnknownAlias { pattern: String, alias: String },
    /// A path segment could not be compiled
    #[error("invalid segment '{segment}' in path '{path}'")]
    InvalidSegment { path: String, segment: String },
    /// `@name:type` names a constraint that does not exist
    #[error("unknown constraint '{constraint}' on parameter '{name}'")]
    UnknownConstraint { name: String, constraint: String },
    /// A `@name*` segment that is not the final one
    #[error("wildcard parameter '{name}' must be the last segment of '{path}'")]
    WildcardNotLast { path: String, name: String },
    /// The `[mode]` suffix is not one of all, ajax, sync, cli
    #[error("unknown request mode '{mode}' in route '{pattern}'")]
    UnknownMode { pattern: String, mode: String },
}

/// Failures raised while a request is being dispatched.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered path template matches the request path
    #[error("no route matched {method} {path}")]
    NoRouteMatched { method: String, path: String },
    /// The path matched but none of its routes accept the verb
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: Vec<String>,
    },
    /// The controller reference could not be turned into a callable
    #[error("unable to resolve controller '{controller}'")]
    UnresolvedController { controller: String },
    /// A required controller parameter had no value
    #[error("insufficient arguments for '{controller}': required {required}, resolved {resolved}")]
    InsufficientArguments {
        controller: String,
        required: usize,
        resolved: usize,
    },
    /// URL building found no value for a named segment
    #[error("missing parameter '{name}' for '{route}'")]
    MissingParameter { route: String, name: String },
    /// URL building was given an alias nobody registered
    #[error("unknown route alias '{alias}'")]
    UnknownAlias { alias: String },
    /// The controller returned an error
    #[error("{0}")]
    UnhandledController(anyhow::Error),
    /// An error listener failed while handling another error
    #[error("{secondary} (while handling: {original})")]
    SecondaryHandler { original: String, secondary: String },
    /// Explicit HTTP error raised by a listener or controller
    #[error("HTTP {code}: {message}")]
    Http {
        code: u16,
        message: String,
        headers: Vec<(String, String)>,
    },
}

impl DispatchError {
    /// Explicit HTTP error with an optional message.
    #[must_use]
    pub fn http(code: u16, message: impl Into<String>) -> Self {
        DispatchError::Http {
            code,
            message: message.into(),
            headers: Vec::new(),
        }
    }

    /// Recover a [`DispatchError`] carried inside an `anyhow` error, wrapping
    /// anything else as [`DispatchError::UnhandledController`].
    #[must_use]
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(inner) => inner,
            Err(other) => DispatchError::UnhandledController(other),
        }
    }

    /// The status code this error is rendered with.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            DispatchError::NoRouteMatched { .. }
            | DispatchError::UnresolvedController { .. }
            | DispatchError::UnknownAlias { .. } => 404,
            DispatchError::MethodNotAllowed { .. } => 405,
            DispatchError::Http { code, .. } => *code,
            DispatchError::UnhandledController(err) => err
                .downcast_ref::<DispatchError>()
                .map_or(500, DispatchError::code),
            DispatchError::InsufficientArguments { .. }
            | DispatchError::MissingParameter { .. }
            | DispatchError::SecondaryHandler { .. } => 500,
        }
    }

    /// Extra headers the error response must carry.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            DispatchError::MethodNotAllowed { allowed, .. } => {
                vec![("Allow".to_string(), allowed.join(", "))]
            }
            DispatchError::Http { headers, .. } => headers.clone(),
            DispatchError::UnhandledController(err) => err
                .downcast_ref::<DispatchError>()
                .map(DispatchError::headers)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Message shown to clients. Routing failures keep the status text only.
    #[must_use]
    pub fn public_message(&self) -> Option<String> {
        match self {
            DispatchError::NoRouteMatched { .. } | DispatchError::MethodNotAllowed { .. } => None,
            DispatchError::Http { message, .. } if message.is_empty() => None,
            DispatchError::Http { message, .. } => Some(message.clone()),
            DispatchError::UnhandledController(err) => match err.downcast_ref::<DispatchError>() {
                Some(inner) => inner.public_message(),
                None => Some(err.to_string()),
            },
            other => Some(other.to_string()),
        }
    }

    /// Error chain lines, outermost first.
    #[must_use]
    pub fn trace(&self) -> Vec<String> {
        match self {
            DispatchError::UnhandledController(err) => err.chain().map(|e| e.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

//! Controller references and the registry that turns them into callables.
//!
//! A route stores a [`ControllerRef`]. Closures are callable directly; the
//! string forms (`"Blog->show"`, `"Blog::show"`, `"blog.show"`) are looked up
//! in the [`ControllerRegistry`] at the CONTROLLER stage.

use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::kernel::{Kernel, RequestContext};
use crate::resolver::Arguments;
use crate::server::Response;

/// Declared type of a controller parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    String,
    /// No coercion
    Any,
    /// Injected: the dispatching kernel
    Kernel,
    /// Injected: the per-request context
    Context,
    /// Injected: a service registered in the container
    Service(TypeId, &'static str),
}

impl ParamKind {
    #[must_use]
    pub fn service<T: Any + Send + Sync>() -> Self {
        ParamKind::Service(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Kinds the resolver fills without looking at request values.
    #[must_use]
    pub fn is_injected(self) -> bool {
        matches!(
            self,
            ParamKind::Kernel | ParamKind::Context | ParamKind::Service(..)
        )
    }
}

/// Descriptor of one formal parameter, built at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub variadic: bool,
}

impl ParamSpec {
    #[must_use]
    pub fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            variadic: false,
        }
    }

    #[must_use]
    pub fn int(name: &str) -> Self {
        Self::new(name, ParamKind::Int)
    }

    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, ParamKind::Float)
    }

    #[must_use]
    pub fn bool(name: &str) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, ParamKind::String)
    }

    #[must_use]
    pub fn any(name: &str) -> Self {
        Self::new(name, ParamKind::Any)
    }

    #[must_use]
    pub fn kernel(name: &str) -> Self {
        Self::new(name, ParamKind::Kernel)
    }

    #[must_use]
    pub fn context(name: &str) -> Self {
        Self::new(name, ParamKind::Context)
    }

    #[must_use]
    pub fn service<T: Any + Send + Sync>(name: &str) -> Self {
        Self::new(name, ParamKind::service::<T>())
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// Raw controller result, finalized at the RESPONSE stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Value(Value),
    Response(Response),
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

impl From<Response> for Output {
    fn from(response: Response) -> Self {
        Output::Response(response)
    }
}

impl From<String> for Output {
    fn from(s: String) -> Self {
        Output::Value(Value::String(s))
    }
}

impl From<&str> for Output {
    fn from(s: &str) -> Self {
        Output::Value(Value::String(s.to_string()))
    }
}

/// What a controller receives when invoked.
pub struct Invocation<'a> {
    pub kernel: &'a Kernel,
    pub context: &'a RequestContext,
    /// Positional arguments in declared parameter order
    pub args: Arguments,
}

pub type HandlerFn = dyn Fn(Invocation<'_>) -> anyhow::Result<Output> + Send + Sync;

/// A callable controller plus its parameter descriptors.
#[derive(Clone)]
pub struct Controller {
    pub name: Arc<str>,
    pub params: Arc<[ParamSpec]>,
    handler: Arc<HandlerFn>,
}

impl Controller {
    pub fn new<F>(name: &str, params: Vec<ParamSpec>, handler: F) -> Self
    where
        F: Fn(Invocation<'_>) -> anyhow::Result<Output> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            params: params.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn call(&self, invocation: Invocation<'_>) -> anyhow::Result<Output> {
        (self.handler)(invocation)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Reference to a controller as written in a route definition.
#[derive(Debug, Clone)]
pub enum ControllerRef {
    Closure(Controller),
    /// `Receiver->method`
    Method { receiver: String, method: String },
    /// `Class::function`
    Static { class: String, function: String },
    /// Any other string, looked up verbatim
    Named(String),
}

impl ControllerRef {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some((receiver, method)) = s.split_once("->") {
            return ControllerRef::Method {
                receiver: receiver.trim().to_string(),
                method: method.trim().to_string(),
            };
        }
        if let Some((class, function)) = s.split_once("::") {
            return ControllerRef::Static {
                class: class.trim().to_string(),
                function: function.trim().to_string(),
            };
        }
        ControllerRef::Named(s.to_string())
    }

    /// Registry key of the reference.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            ControllerRef::Closure(c) => c.name.to_string(),
            ControllerRef::Method { receiver, method } => format!("{receiver}->{method}"),
            ControllerRef::Static { class, function } => format!("{class}::{function}"),
            ControllerRef::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerRef::Closure(c) => write!(f, "closure({})", c.name),
            other => f.write_str(&other.describe()),
        }
    }
}

impl From<Controller> for ControllerRef {
    fn from(c: Controller) -> Self {
        ControllerRef::Closure(c)
    }
}

impl From<&str> for ControllerRef {
    fn from(s: &str) -> Self {
        ControllerRef::parse(s)
    }
}

impl From<String> for ControllerRef {
    fn from(s: String) -> Self {
        ControllerRef::parse(&s)
    }
}

/// Maps string controller references to callables.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Controller>,
    fallback: Option<Controller>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `name`, normalized through [`ControllerRef::parse`] so
    /// `"Blog -> show"` and `"Blog->show"` are the same key.
    pub fn register(&mut self, name: &str, controller: Controller) {
        let key = ControllerRef::parse(name).describe();
        debug!(controller = %key, "Controller registered");
        self.controllers.insert(key, controller);
    }

    /// Used for string references nobody registered.
    pub fn set_fallback(&mut self, controller: Controller) {
        self.fallback = Some(controller);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.controllers
            .contains_key(&ControllerRef::parse(name).describe())
    }

    #[must_use]
    pub fn resolve(&self, reference: &ControllerRef) -> Option<Controller> {
        match reference {
            ControllerRef::Closure(c) => Some(c.clone()),
            other => self
                .controllers
                .get(&other.describe())
                .or(self.fallback.as_ref())
                .cloned(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

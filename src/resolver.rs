//! Argument resolver.
//!
//! Binds a controller's [`ParamSpec`] list to the values available for a
//! request (route params, then query values, then JSON body fields) and
//! returns them in declared order.

use serde::de::DeserializeOwned;
use serde_json::{Number, Value};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::container::ServiceContainer;
use crate::controller::{ParamKind, ParamSpec};
use crate::error::DispatchError;

/// One resolved positional argument.
#[derive(Clone)]
pub enum Argument {
    Value(Value),
    Service(Arc<dyn Any + Send + Sync>),
    /// Placeholder for the kernel; controllers read it from the invocation
    Kernel,
    /// Placeholder for the request context
    Context,
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "Value({v})"),
            Argument::Service(_) => f.write_str("Service(..)"),
            Argument::Kernel => f.write_str("Kernel"),
            Argument::Context => f.write_str("Context"),
        }
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Argument::Value(a), Argument::Value(b)) => a == b,
            (Argument::Service(a), Argument::Service(b)) => Arc::ptr_eq(a, b),
            (Argument::Kernel, Argument::Kernel) | (Argument::Context, Argument::Context) => true,
            _ => false,
        }
    }
}

/// Positional argument list handed to a controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    names: Vec<String>,
    items: Vec<Argument>,
}

impl Arguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain values with no parameter names, as a listener replacing the
    /// list would build it.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            names: vec![String::new(); values.len()],
            items: values.into_iter().map(Argument::Value).collect(),
        }
    }

    pub fn push(&mut self, name: &str, argument: Argument) {
        self.names.push(name.to_string());
        self.items.push(argument);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Argument> {
        self.items.iter()
    }

    #[must_use]
    pub fn argument(&self, index: usize) -> Option<&Argument> {
        self.items.get(index)
    }

    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.items.get(index)? {
            Argument::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Value bound to the parameter called `name`.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.value(index)
    }

    pub fn get<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self
            .value(index)
            .ok_or_else(|| anyhow::anyhow!("no value argument at position {index}"))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    #[must_use]
    pub fn int(&self, index: usize) -> Option<i64> {
        self.value(index).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index).and_then(Value::as_str)
    }

    #[must_use]
    pub fn service<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        match self.items.get(index)? {
            Argument::Service(s) => Arc::clone(s).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Items of an array argument, typically a variadic or wildcard.
    #[must_use]
    pub fn rest(&self, index: usize) -> Vec<Value> {
        match self.value(index) {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }

    /// The argument values as a JSON array; injected arguments are null.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|a| match a {
                    Argument::Value(v) => v.clone(),
                    _ => Value::Null,
                })
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Arguments {
    type Item = &'a Argument;
    type IntoIter = std::slice::Iter<'a, Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Bind `params` in declared order.
///
/// Injected kinds never consult `available`. A named value is coerced for
/// scalar kinds and passed through unchanged when coercion does not apply.
/// A variadic without a named value consumes every value no earlier
/// parameter took and no later parameter names, flattening arrays.
pub fn resolve_arguments(
    controller: &str,
    params: &[ParamSpec],
    available: &[(String, Value)],
    services: &ServiceContainer,
) -> Result<Arguments, DispatchError> {
    let mut consumed = vec![false; available.len()];
    let mut args = Arguments::new();

    for (position, param) in params.iter().enumerate() {
        let argument = match param.kind {
            ParamKind::Kernel => Some(Argument::Kernel),
            ParamKind::Context => Some(Argument::Context),
            ParamKind::Service(type_id, _) => services.resolve_by_id(type_id).map(Argument::Service),
            kind => {
                let named = available
                    .iter()
                    .enumerate()
                    .find(|(i, (k, _))| !consumed[*i] && *k == param.name);
                if let Some((index, (_, value))) = named {
                    consumed[index] = true;
                    Some(Argument::Value(coerce(kind, value)))
                } else if let Some(default) = &param.default {
                    Some(Argument::Value(default.clone()))
                } else if param.variadic {
                    let mut rest = Vec::new();
                    let later = &params[position + 1..];
                    for (index, (key, value)) in available.iter().enumerate() {
                        if consumed[index] || later.iter().any(|p| p.name == *key) {
                            continue;
                        }
                        consumed[index] = true;
                        match value {
                            Value::Array(items) => {
                                rest.extend(items.iter().map(|v| coerce(kind, v)));
                            }
                            other => rest.push(coerce(kind, other)),
                        }
                    }
                    Some(Argument::Value(Value::Array(rest)))
                } else {
                    None
                }
            }
        };

        match argument {
            Some(argument) => {
                trace!(controller = %controller, param = %param.name, "Argument bound");
                args.push(&param.name, argument);
            }
            None => {
                let required = params
                    .iter()
                    .filter(|p| p.default.is_none() && !p.variadic)
                    .count();
                debug!(
                    controller = %controller,
                    param = %param.name,
                    required,
                    resolved = args.len(),
                    "Insufficient arguments"
                );
                return Err(DispatchError::InsufficientArguments {
                    controller: controller.to_string(),
                    required,
                    resolved: args.len(),
                });
            }
        }
    }

    Ok(args)
}

/// Scalar coercion for a declared kind. Anything ambiguous passes through.
#[must_use]
pub fn coerce(kind: ParamKind, value: &Value) -> Value {
    let coerced = match (kind, value) {
        (ParamKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (ParamKind::Int, Value::Bool(b)) => Some(Value::from(i64::from(*b))),
        (ParamKind::Int, Value::Number(n)) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::from(f as i64)),
        (ParamKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (ParamKind::Float, Value::Number(n)) if !n.is_f64() => {
            n.as_f64().and_then(Number::from_f64).map(Value::Number)
        }
        (ParamKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(Value::Bool(true)),
            "0" | "false" | "off" | "no" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        (ParamKind::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        (ParamKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    };
    coerced.unwrap_or_else(|| value.clone())
}

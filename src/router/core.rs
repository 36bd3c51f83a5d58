//! Route table, alias registry and URL builder.

use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::controller::{Controller, ControllerRef, Output};
use crate::error::{DispatchError, RouteParseError};
use crate::server::{Request, RequestMode, Response};

use super::pattern::{MethodVec, PathTemplate, RoutePattern, Segment};

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 params (e.g., /users/@id/posts/@post).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Value bound to a path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// `@name` and `@name:type`
    Single(String),
    /// `@name*`, one entry per trailing segment
    Rest(Vec<String>),
}

impl ParamValue {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            ParamValue::Single(s) => Value::String(s.clone()),
            ParamValue::Rest(parts) => {
                Value::Array(parts.iter().cloned().map(Value::String).collect())
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Rest(_) => None,
        }
    }
}

/// Path parameters in declaration order, stack-allocated for ≤8 params.
pub type ParamVec = SmallVec<[(Arc<str>, ParamValue); MAX_INLINE_PARAMS]>;

/// Guard predicate evaluated against the request after the path matched.
pub type RouteCheck = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Registration options of a route.
#[derive(Clone, Default)]
pub struct RouteOptions {
    /// Higher wins when several routes match the same request
    pub priority: i32,
    /// The route is skipped when this returns false
    pub check: Option<RouteCheck>,
    /// Free-form metadata listeners can read from the matched route
    pub extra: serde_json::Map<String, Value>,
}

impl RouteOptions {
    #[must_use]
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("priority", &self.priority)
            .field("check", &self.check.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

/// A registered route. Immutable once added to the table.
#[derive(Debug)]
pub struct Route {
    /// Expression the route was registered with
    pub pattern: String,
    pub methods: MethodVec,
    pub alias: Option<String>,
    pub template: PathTemplate,
    pub mode: RequestMode,
    pub controller: ControllerRef,
    pub options: RouteOptions,
    /// Registration order, used as the last tie-breaker
    pub seq: usize,
}

impl Route {
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.options.priority
    }

    /// HEAD is served by GET routes.
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method) || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }

    fn ordering_key(&self) -> (i32, usize, usize, usize) {
        let (literals, dynamic) = self.template.specificity();
        (self.priority(), literals, dynamic, self.seq)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        write!(f, "{}", methods.join("|"))?;
        if let Some(alias) = &self.alias {
            write!(f, " {alias}")?;
        }
        write!(f, " {}", self.template)?;
        if self.mode != RequestMode::All {
            write!(f, " [{}]", self.mode.as_str())?;
        }
        Ok(())
    }
}

/// Result of successfully matching a request path to a route
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Path parameters extracted from the URL, in declaration order
    pub params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Parameters as `(name, value)` pairs, the form the argument resolver and
    /// the URL builder take.
    #[must_use]
    pub fn values(&self) -> Vec<(String, Value)> {
        self.params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_value()))
            .collect()
    }
}

/// Route table keyed by path template, with the alias registry.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
    aliases: HashMap<String, PathTemplate>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route from an expression like `GET|POST alias /path/@id`.
    pub fn add_route(
        &mut self,
        pattern: &str,
        controller: impl Into<ControllerRef>,
        options: RouteOptions,
    ) -> Result<Arc<Route>, RouteParseError> {
        let parsed = RoutePattern::parse(pattern)?;
        let template = match (&parsed.path, &parsed.alias) {
            (Some(path), _) => PathTemplate::compile(path)?,
            (None, Some(alias)) => {
                self.aliases
                    .get(alias)
                    .cloned()
                    .ok_or_else(|| RouteParseError::UnknownAlias {
                        pattern: pattern.to_string(),
                        alias: alias.clone(),
                    })?
            }
            (None, None) => {
                return Err(RouteParseError::Malformed {
                    pattern: pattern.to_string(),
                })
            }
        };

        if let Some(alias) = &parsed.alias {
            self.aliases.insert(alias.clone(), template.clone());
        }

        let route = Arc::new(Route {
            pattern: pattern.to_string(),
            methods: parsed.methods,
            alias: parsed.alias,
            template,
            mode: parsed.mode,
            controller: controller.into(),
            options,
            seq: self.routes.len(),
        });

        debug!(
            route = %route,
            controller = %route.controller,
            priority = route.priority(),
            "Route registered"
        );
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// Register the resource routes of a controller:
    ///
    /// | verbs      | path        | alias        | method    |
    /// |------------|-------------|--------------|-----------|
    /// | GET        | `/path`     | `alias`      | `index`   |
    /// | POST       | `/path`     | `alias`      | `store`   |
    /// | GET        | `/path/@id` | `alias_item` | `show`    |
    /// | PUT, PATCH | `/path/@id` | `alias_item` | `update`  |
    /// | DELETE     | `/path/@id` | `alias_item` | `destroy` |
    pub fn rest(&mut self, expr: &str, controller: &str) -> Result<Vec<Arc<Route>>, RouteParseError> {
        let parsed = RoutePattern::parse(expr)?;
        let path = match (&parsed.path, &parsed.alias) {
            (Some(path), _) => path.trim_end_matches('/').to_string(),
            (None, Some(alias)) => self
                .aliases
                .get(alias)
                .map(|t| t.as_str().trim_end_matches('/').to_string())
                .ok_or_else(|| RouteParseError::UnknownAlias {
                    pattern: expr.to_string(),
                    alias: alias.clone(),
                })?,
            (None, None) => {
                return Err(RouteParseError::Malformed {
                    pattern: expr.to_string(),
                })
            }
        };
        let (alias, item_alias) = match &parsed.alias {
            Some(alias) => (format!(" {alias}"), format!(" {alias}_item")),
            None => (String::new(), String::new()),
        };
        let mode = match parsed.mode {
            RequestMode::All => String::new(),
            other => format!(" [{}]", other.as_str()),
        };
        let collection = if path.is_empty() { "/" } else { path.as_str() };
        let item = format!("{path}/@id");

        let table = [
            ("GET", &alias, collection, "index"),
            ("POST", &alias, collection, "store"),
            ("GET", &item_alias, item.as_str(), "show"),
            ("PUT|PATCH", &item_alias, item.as_str(), "update"),
            ("DELETE", &item_alias, item.as_str(), "destroy"),
        ];
        table
            .into_iter()
            .map(|(verbs, alias, path, method)| {
                self.add_route(
                    &format!("{verbs}{alias} {path}{mode}"),
                    ControllerRef::Method {
                        receiver: controller.to_string(),
                        method: method.to_string(),
                    },
                    RouteOptions::default(),
                )
            })
            .collect()
    }

    /// Register a route answering with a redirect. `target` is a URL, an
    /// absolute path or an alias resolved at request time.
    pub fn redirect(
        &mut self,
        expr: &str,
        target: &str,
        permanent: bool,
    ) -> Result<Arc<Route>, RouteParseError> {
        let target = target.to_string();
        let controller = Controller::new("redirect", Vec::new(), move |inv| {
            let location = if target.starts_with('/') || target.contains("://") {
                target.clone()
            } else {
                inv.kernel.url(&target, &inv.context.route_values())?
            };
            Ok(Output::Response(Response::redirect(&location, permanent)))
        });
        self.add_route(expr, controller, RouteOptions::default())
    }

    /// All registered routes in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    #[must_use]
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    #[must_use]
    pub fn alias_path(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(PathTemplate::as_str)
    }

    /// Print all registered routes to stdout
    pub fn dump_routes(&self) {
        println!("[routes] count={}", self.routes.len());
        for route in &self.routes {
            println!(
                "[route] {route} -> {} (priority {})",
                route.controller,
                route.priority()
            );
        }
    }

    /// Every route matching `path` and accepting `method`, best first:
    /// highest priority, then most literal segments, then fewest dynamic
    /// segments, then registration order.
    #[must_use]
    pub fn resolve_all(&self, path: &str, method: &Method) -> Vec<RouteMatch> {
        let mut matches: Vec<RouteMatch> = self
            .routes
            .iter()
            .filter(|route| route.accepts(method))
            .filter_map(|route| {
                route.template.matches(path).map(|params| RouteMatch {
                    route: Arc::clone(route),
                    params,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            let (pa, la, da, sa) = a.route.ordering_key();
            let (pb, lb, db, sb) = b.route.ordering_key();
            pb.cmp(&pa)
                .then(lb.cmp(&la))
                .then(da.cmp(&db))
                .then(sa.cmp(&sb))
        });
        matches
    }

    /// Best route for `path` and `method`.
    ///
    /// Returns `None` both when nothing matches the path and when the path
    /// matches but no route accepts the verb; [`allowed_methods`](Self::allowed_methods)
    /// tells the two apart.
    #[must_use]
    pub fn resolve(&self, path: &str, method: &Method) -> Option<RouteMatch> {
        let result = self.resolve_all(path, method).into_iter().next();
        match &result {
            Some(m) => debug!(
                method = %method,
                path = %path,
                route = %m.route,
                params = ?m.params,
                "Route matched"
            ),
            None => debug!(method = %method, path = %path, "No route matched"),
        }
        result
    }

    /// Candidates for a full request: [`resolve_all`](Self::resolve_all)
    /// filtered by the route's request mode and `check` guard.
    #[must_use]
    pub fn resolve_request(&self, request: &Request) -> Vec<RouteMatch> {
        let mode = request.mode();
        self.resolve_all(&request.path, &request.method)
            .into_iter()
            .filter(|m| m.route.mode.accepts(mode))
            .filter(|m| m.route.options.check.as_ref().is_none_or(|check| check(request)))
            .collect()
    }

    /// Verbs accepted by any route whose template matches `path`.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut allowed: Vec<String> = Vec::new();
        for route in self.routes.iter().filter(|r| r.template.matches(path).is_some()) {
            for method in &route.methods {
                if !allowed.iter().any(|m| m == method.as_str()) {
                    allowed.push(method.as_str().to_string());
                }
            }
        }
        if allowed.iter().any(|m| m == "GET") && !allowed.iter().any(|m| m == "HEAD") {
            allowed.push("HEAD".to_string());
        }
        allowed
    }

    /// Build a URL from an alias (or a raw template starting with `/`).
    ///
    /// Named segments take their value from `params` by name; a wildcard
    /// takes an array joined with `/`. Unused params become the query string.
    pub fn build_url(&self, name: &str, params: &[(String, Value)]) -> Result<String, DispatchError> {
        let compiled;
        let template = if name.starts_with('/') {
            compiled = PathTemplate::compile(name).map_err(|_| DispatchError::UnknownAlias {
                alias: name.to_string(),
            })?;
            &compiled
        } else {
            self.aliases
                .get(name)
                .ok_or_else(|| DispatchError::UnknownAlias {
                    alias: name.to_string(),
                })?
        };

        let mut used = vec![false; params.len()];
        let mut take = |key: &str| -> Option<&Value> {
            let idx = params
                .iter()
                .enumerate()
                .position(|(i, (k, v))| !used[i] && k == key && !v.is_null())?;
            used[idx] = true;
            Some(&params[idx].1)
        };
        let missing = |param: &str| DispatchError::MissingParameter {
            route: name.to_string(),
            name: param.to_string(),
        };

        let mut path = String::new();
        for segment in template.segments() {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param { name: param, .. } => {
                    let value = take(param)
                        .map(scalar_to_string)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| missing(param))?;
                    path.push_str(&urlencoding::encode(&value));
                }
                Segment::Wildcard(param) => {
                    let value = take(param).ok_or_else(|| missing(param))?;
                    let parts: Vec<String> = match value {
                        Value::Array(items) => items
                            .iter()
                            .map(scalar_to_string)
                            .filter(|s| !s.is_empty())
                            .map(|s| urlencoding::encode(&s).into_owned())
                            .collect(),
                        other => scalar_to_string(other)
                            .split('/')
                            .filter(|s| !s.is_empty())
                            .map(|s| urlencoding::encode(s).into_owned())
                            .collect(),
                    };
                    if parts.is_empty() {
                        return Err(missing(param));
                    }
                    path.push_str(&parts.join("/"));
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        let mut has_query = false;
        for (idx, (key, value)) in params.iter().enumerate() {
            if used[idx] || value.is_null() {
                continue;
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        query.append_pair(key, &scalar_to_string(item));
                    }
                }
                other => {
                    query.append_pair(key, &scalar_to_string(other));
                }
            }
            has_query = true;
        }
        if has_query {
            path.push('?');
            path.push_str(&query.finish());
        }

        info!(name = %name, url = %path, "URL built");
        Ok(path)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

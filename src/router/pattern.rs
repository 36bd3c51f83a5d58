//! Route expression parsing and path template matching.
//!
//! A route is registered with an expression such as
//!
//! ```text
//! GET|POST user_edit /users/@id:digit/edit [sync]
//! ```
//!
//! `METHODS` is one or more verbs separated by `|` or `,`; the alias, the
//! path and the `[mode]` suffix are optional. Path segments are literals,
//! `@name` parameters, `@name:type` constrained parameters or a trailing
//! `@name*` wildcard.

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

use crate::error::RouteParseError;
use crate::server::RequestMode;

use super::core::{ParamValue, ParamVec};

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(
        r"^\s*(?:([A-Za-z]+(?:\s*[|,]\s*[A-Za-z]+)*)\s+)?(?:([A-Za-z_][\w.\-]*)\s*)?(/\S*)?\s*(?:\[(\w+)\])?\s*$",
    )
    .expect("route expression regex")
});

/// Type constraint of a `@name:type` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// `[0-9]+`
    Digit,
    /// `[A-Za-z]+`
    Alpha,
    /// `[A-Za-z0-9]+`
    Alnum,
    /// `\w+`
    Word,
    Lower,
    Upper,
}

impl Constraint {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "digit" | "int" => Some(Constraint::Digit),
            "alpha" => Some(Constraint::Alpha),
            "alnum" => Some(Constraint::Alnum),
            "word" => Some(Constraint::Word),
            "lower" => Some(Constraint::Lower),
            "upper" => Some(Constraint::Upper),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Constraint::Digit => "digit",
            Constraint::Alpha => "alpha",
            Constraint::Alnum => "alnum",
            Constraint::Word => "word",
            Constraint::Lower => "lower",
            Constraint::Upper => "upper",
        }
    }

    fn regex(self) -> &'static Regex {
        static DIGIT: Lazy<Regex> = Lazy::new(|| anchored(r"[0-9]+"));
        static ALPHA: Lazy<Regex> = Lazy::new(|| anchored(r"[A-Za-z]+"));
        static ALNUM: Lazy<Regex> = Lazy::new(|| anchored(r"[A-Za-z0-9]+"));
        static WORD: Lazy<Regex> = Lazy::new(|| anchored(r"\w+"));
        static LOWER: Lazy<Regex> = Lazy::new(|| anchored(r"[a-z]+"));
        static UPPER: Lazy<Regex> = Lazy::new(|| anchored(r"[A-Z]+"));
        match self {
            Constraint::Digit => &DIGIT,
            Constraint::Alpha => &ALPHA,
            Constraint::Alnum => &ALNUM,
            Constraint::Word => &WORD,
            Constraint::Lower => &LOWER,
            Constraint::Upper => &UPPER,
        }
    }

    #[must_use]
    pub fn is_match(self, value: &str) -> bool {
        self.regex().is_match(value)
    }
}

#[allow(clippy::expect_used)]
fn anchored(class: &str) -> Regex {
    Regex::new(&format!("^{class}$")).expect("constraint regex")
}

/// One compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param {
        name: Arc<str>,
        constraint: Option<Constraint>,
    },
    /// Binds one or more trailing segments; always last
    Wildcard(Arc<str>),
}

impl Segment {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param { name, .. } | Segment::Wildcard(name) => Some(name.as_ref()),
        }
    }
}

/// Compiled path of a route. Built once at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a path such as `/param/@param/@rest*`.
    pub fn compile(path: &str) -> Result<Self, RouteParseError> {
        let trimmed = path.trim_matches('/');
        let mut segments = Vec::new();
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        for (idx, part) in parts.iter().enumerate() {
            let segment = Self::compile_segment(path, part)?;
            if let Segment::Wildcard(name) = &segment {
                if idx + 1 != parts.len() {
                    return Err(RouteParseError::WildcardNotLast {
                        path: path.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: format!("/{trimmed}"),
            segments,
        })
    }

    fn compile_segment(path: &str, part: &str) -> Result<Segment, RouteParseError> {
        let invalid = || RouteParseError::InvalidSegment {
            path: path.to_string(),
            segment: part.to_string(),
        };

        let Some(spec) = part.strip_prefix('@') else {
            if part.is_empty() {
                return Err(invalid());
            }
            return Ok(Segment::Literal(part.to_string()));
        };

        if let Some(name) = spec.strip_suffix('*') {
            if !is_identifier(name) {
                return Err(invalid());
            }
            return Ok(Segment::Wildcard(Arc::from(name)));
        }

        let (name, constraint) = match spec.split_once(':') {
            Some((name, ty)) => {
                let constraint =
                    Constraint::parse(ty).ok_or_else(|| RouteParseError::UnknownConstraint {
                        name: name.to_string(),
                        constraint: ty.to_string(),
                    })?;
                (name, Some(constraint))
            }
            None => (spec, None),
        };
        if !is_identifier(name) {
            return Err(invalid());
        }
        Ok(Segment::Param {
            name: Arc::from(name),
            constraint,
        })
    }

    /// Normalized template text, e.g. `/users/@id:digit`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::name)
    }

    /// `(literals, dynamic)` counts. More literals and fewer dynamic
    /// segments is more specific.
    #[must_use]
    pub fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        (literals, self.segments.len() - literals)
    }

    /// Match a request path, returning the bound parameters in declaration order.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        let trimmed = path.trim_matches('/');
        let incoming: SmallVec<[&str; 16]> = if trimmed.is_empty() {
            SmallVec::new()
        } else {
            trimmed.split('/').collect()
        };

        if self.has_wildcard() {
            if incoming.len() < self.segments.len() {
                return None;
            }
        } else if incoming.len() != self.segments.len() {
            return None;
        }

        let mut params = ParamVec::new();
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    if incoming[idx] != text {
                        return None;
                    }
                }
                Segment::Param { name, constraint } => {
                    let value = decode(incoming[idx]);
                    if value.is_empty() {
                        return None;
                    }
                    if let Some(constraint) = constraint {
                        if !constraint.is_match(&value) {
                            return None;
                        }
                    }
                    params.push((Arc::clone(name), ParamValue::Single(value)));
                }
                Segment::Wildcard(name) => {
                    let rest: Vec<String> = incoming[idx..].iter().map(|s| decode(s)).collect();
                    params.push((Arc::clone(name), ParamValue::Rest(rest)));
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Verb list of a route.
pub type MethodVec = SmallVec<[Method; 4]>;

/// A parsed registration expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pub methods: MethodVec,
    pub alias: Option<String>,
    /// `None` when the expression reuses an existing alias' path
    pub path: Option<String>,
    pub mode: RequestMode,
}

impl RoutePattern {
    /// Parse `METHODS [alias] [/path] [[mode]]`.
    pub fn parse(expr: &str) -> Result<Self, RouteParseError> {
        if expr.trim().is_empty() {
            return Err(RouteParseError::Empty);
        }
        let malformed = || RouteParseError::Malformed {
            pattern: expr.to_string(),
        };
        let caps = EXPRESSION.captures(expr).ok_or_else(malformed)?;

        let verbs = caps.get(1).map(|m| m.as_str().trim());
        let alias = caps.get(2).map(|m| m.as_str().to_string());
        let path = caps.get(3).map(|m| m.as_str().to_string());

        // "home /x": a single leading word that is not a verb is the alias.
        let (methods, alias) = match verbs {
            Some(word) if alias.is_none() && !word.contains(['|', ',']) && !is_method_token(word) => {
                (MethodVec::from_elem(Method::GET, 1), Some(word.to_string()))
            }
            Some(verbs) => (parse_methods(expr, verbs)?, alias),
            None => (MethodVec::from_elem(Method::GET, 1), alias),
        };

        if path.is_none() && alias.is_none() {
            return Err(malformed());
        }

        let mode = match caps.get(4) {
            Some(m) => RequestMode::parse(m.as_str()).ok_or_else(|| {
                RouteParseError::UnknownMode {
                    pattern: expr.to_string(),
                    mode: m.as_str().to_string(),
                }
            })?,
            None => RequestMode::All,
        };

        Ok(Self {
            methods,
            alias,
            path,
            mode,
        })
    }
}

fn is_method_token(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" | "OPTIONS" | "TRACE" | "CONNECT"
    )
}

fn parse_methods(expr: &str, verbs: &str) -> Result<MethodVec, RouteParseError> {
    let mut methods = MethodVec::new();
    for verb in verbs.split(['|', ',']) {
        let verb = verb.trim().to_ascii_uppercase();
        if !is_method_token(&verb) {
            return Err(RouteParseError::InvalidMethod {
                pattern: expr.to_string(),
                method: verb,
            });
        }
        let method =
            Method::from_bytes(verb.as_bytes()).map_err(|_| RouteParseError::InvalidMethod {
                pattern: expr.to_string(),
                method: verb.clone(),
            })?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    Ok(methods)
}

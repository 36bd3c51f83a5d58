use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers/cookies before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage. Names are `Arc<str>` since they repeat across requests.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request mode a route may be restricted to with a `[mode]` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Route accepts every mode
    #[default]
    All,
    /// `X-Requested-With: XMLHttpRequest`
    Ajax,
    /// Regular browser/API request
    Sync,
    /// Request simulated from the command line
    Cli,
}

impl RequestMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Some(RequestMode::All),
            "ajax" => Some(RequestMode::Ajax),
            "sync" => Some(RequestMode::Sync),
            "cli" => Some(RequestMode::Cli),
            _ => None,
        }
    }

    /// Lowercase name as written in route expressions.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequestMode::All => "all",
            RequestMode::Ajax => "ajax",
            RequestMode::Sync => "sync",
            RequestMode::Cli => "cli",
        }
    }

    /// Whether a route declared with `self` serves a request in `mode`.
    #[must_use]
    pub fn accepts(self, mode: RequestMode) -> bool {
        self == RequestMode::All || self == mode
    }
}

/// Pre-parsed request handed to the kernel by the transport.
///
/// Header names are compared case-insensitively; `path` never carries the
/// query string, which is parsed into `query`.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without query string
    pub path: String,
    /// HTTP headers
    pub headers: HeaderVec,
    /// Parsed query string parameters
    pub query: HashMap<String, String>,
    /// Cookies parsed from the Cookie header
    pub cookies: HashMap<String, String>,
    /// Body decoded as JSON when possible
    pub body: Option<Value>,
    /// Raw body bytes
    pub raw_body: Vec<u8>,
    /// Server variables supplied by the host (remote address, protocol, ...)
    pub server: HashMap<String, String>,
    /// Set when the request comes from the command line
    pub cli: bool,
}

impl Request {
    /// Build a request from a method and a path that may contain a query string.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, _)) => (path, parse_query_params(target)),
            None => (target, HashMap::new()),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_string(),
            headers: HeaderVec::new(),
            query,
            cookies: HashMap::new(),
            body: None,
            raw_body: Vec::new(),
            server: HashMap::new(),
            cli: false,
        }
    }

    #[must_use]
    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    /// Add a header. A `Cookie` header also refreshes the parsed cookies.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        if name.eq_ignore_ascii_case("cookie") {
            self.cookies = parse_cookies(&self.headers);
        }
        self
    }

    /// Set the body. JSON content is decoded into `body`.
    #[must_use]
    pub fn with_raw_body(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw_body = raw.into();
        self.body = serde_json::from_slice(&self.raw_body).ok();
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.raw_body = body.to_string().into_bytes();
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_server(mut self, key: &str, value: impl Into<String>) -> Self {
        self.server.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_cli(mut self, cli: bool) -> Self {
        self.cli = cli;
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    /// Content negotiation for error output: AJAX requests and clients that
    /// rank JSON above HTML get JSON.
    #[must_use]
    pub fn wants_json(&self) -> bool {
        if self.is_ajax() {
            return true;
        }
        match self.header("accept") {
            Some(accept) => prefers_json(accept),
            None => false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> RequestMode {
        if self.cli {
            RequestMode::Cli
        } else if self.is_ajax() {
            RequestMode::Ajax
        } else {
            RequestMode::Sync
        }
    }
}

/// Compare the best quality given to a JSON media type against HTML.
fn prefers_json(accept: &str) -> bool {
    let mut json_q: f32 = 0.0;
    let mut html_q: f32 = 0.0;
    for item in accept.split(',') {
        let mut parts = item.trim().split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);
        if media == "application/json" || media.ends_with("+json") {
            json_q = json_q.max(q);
        } else if media == "text/html" || media == "application/xhtml+xml" {
            html_q = html_q.max(q);
        }
    }
    json_q > 0.0 && json_q > html_q
}

/// Parse cookies from the Cookie header.
pub fn parse_cookies(headers: &HeaderVec) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, c)| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim().to_string();
                    if name.is_empty() {
                        return None;
                    }
                    let value = parts.next().unwrap_or("").trim().to_string();
                    Some((name, value))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
pub fn parse_query_params(path: &str) -> HashMap<String, String> {
    match path.split_once('?') {
        Some((_, query_str)) => url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        None => HashMap::new(),
    }
}

//! # Kernel Configuration
//!
//! [`KernelConfig`] carries the kernel flags and, optionally, a route table
//! so an application can be wired from a file instead of code.
//!
//! ## File formats
//!
//! [`KernelConfig::load`] picks the parser from the extension: `.yaml` /
//! `.yml` use `serde_yaml`, `.toml` uses `toml`.
//!
//! ```yaml
//! debug: true
//! powered_by: Stick
//! routes:
//!   - route: "GET home /"
//!     controller: "Home->index"
//!   - route: "GET /blog/@slug"
//!     controller: "Blog->show"
//!     priority: 5
//! redirects:
//!   - route: "GET /old"
//!     to: home
//!     permanent: true
//! rest:
//!   - route: "posts /posts"
//!     controller: Post
//! ```
//!
//! ## Environment Variables
//!
//! [`KernelConfig::apply_env`] overlays these onto a loaded config:
//!
//! - `STICK_DEBUG`: include traces in error output
//! - `STICK_QUIET`: emit headers only
//! - `STICK_HIDE_ERRORS`: replace controller error messages with the status text
//! - `STICK_POWERED_BY`: value of the `X-Powered-By` header, empty to disable
//!
//! Boolean variables accept `1`, `true`, `yes` and `on`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unsupported config format for {path} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat { path: PathBuf },
}

/// A route bound to a string controller reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteEntry {
    pub route: String,
    pub controller: String,
    #[serde(default)]
    pub priority: i32,
}

/// A route answered with a redirect to a URL, path or alias.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedirectEntry {
    pub route: String,
    pub to: String,
    #[serde(default)]
    pub permanent: bool,
}

/// Resource routes for a controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RestEntry {
    pub route: String,
    pub controller: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Include error traces in error output
    pub debug: bool,
    /// Emit headers only
    pub quiet: bool,
    /// Replace messages of controller failures with the status text
    pub hide_errors: bool,
    /// `X-Powered-By` header value
    pub powered_by: Option<String>,
    /// minijinja template used for HTML error pages
    pub error_template: Option<PathBuf>,
    pub routes: Vec<RouteEntry>,
    pub redirects: Vec<RedirectEntry>,
    pub rest: Vec<RestEntry>,
}

impl KernelConfig {
    /// Load a YAML or TOML file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str, &Path) -> Result<Self, ConfigError> = match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str,
            Some("toml") => Self::from_toml_str,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&source, path)
    }

    fn from_yaml_str(source: &str, path: &Path) -> Result<Self, ConfigError> {
        // an empty document is the default config
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(source).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml_str(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with the environment overlay applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_flag("STICK_DEBUG") {
            self.debug = v;
        }
        if let Some(v) = env_flag("STICK_QUIET") {
            self.quiet = v;
        }
        if let Some(v) = env_flag("STICK_HIDE_ERRORS") {
            self.hide_errors = v;
        }
        if let Ok(v) = env::var("STICK_POWERED_BY") {
            self.powered_by = if v.is_empty() { None } else { Some(v) };
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

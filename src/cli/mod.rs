//! # CLI Module
//!
//! The `stick` binary: inspect and exercise a route table defined in a
//! config file (see [`crate::config`]).
//!
//! ## Commands
//!
//! ```bash
//! stick --config routes.yaml routes
//! stick --config routes.yaml resolve GET /posts/3
//! stick --config routes.yaml url posts_item id=3
//! stick --config routes.yaml mock "POST /posts" --body '{"title":"x"}' -H "Accept: application/json"
//! ```
//!
//! Controllers referenced by the config are answered by the echo
//! controller, so `mock` shows the route, parameters and body a real
//! controller would receive.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{execute, run_cli, Cli, Commands};

use anyhow::Context;
use clap::{Parser, Subcommand};
use http::Method;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::PathBuf;

use crate::config::KernelConfig;
use crate::echo::echo_controller;
use crate::kernel::Kernel;

/// Command-line interface for stick
///
/// Loads a route table from a config file and inspects or exercises it
/// without a server. Controllers named in the config answer with the echo
/// controller.
#[derive(Parser, Debug)]
#[command(name = "stick")]
#[command(about = "Route table and dispatch inspector", long_about = None)]
pub struct Cli {
    /// YAML or TOML config with routes, redirects and rest entries
    #[arg(short, long, global = true, env = "STICK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Include error traces in responses
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List registered routes
    Routes,
    /// Show which route a request would reach
    Resolve {
        /// HTTP verb
        method: String,
        /// Request path
        path: String,
    },
    /// Build a URL from an alias
    Url {
        alias: String,
        /// Parameters as key=value
        params: Vec<String>,
    },
    /// Run a full dispatch, e.g. `stick mock "GET /posts/1"`
    Mock {
        /// `METHOD /path?query` or `METHOD alias(k=v)`, optionally followed by [ajax] or [cli]
        expr: String,
        /// Request body
        #[arg(long)]
        body: Option<String>,
        /// Extra header as `Name: value` (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
        /// Print headers only
        #[arg(long, default_value_t = false)]
        head: bool,
    },
}

fn build_kernel(cli: &Cli) -> anyhow::Result<Kernel> {
    let mut config = match &cli.config {
        Some(path) => KernelConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => KernelConfig::default(),
    };
    config.apply_env();
    config.debug |= cli.debug;
    let kernel = Kernel::from_config(config).context("registering config routes")?;
    kernel.fallback_controller(echo_controller());
    Ok(kernel)
}

fn parse_pairs(pairs: &[String], sep: char) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once(sep)
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow::anyhow!("expected '{sep}' in '{pair}'"))
        })
        .collect()
}

/// Run one command, writing its output to `out`.
pub fn execute(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let kernel = build_kernel(cli)?;
    match &cli.command {
        Commands::Routes => {
            let router = kernel.router();
            for route in router.routes() {
                writeln!(
                    out,
                    "{:<40} -> {} (priority {})",
                    route.to_string(),
                    route.controller,
                    route.priority()
                )?;
            }
        }
        Commands::Resolve { method, path } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid method '{method}'"))?;
            let router = kernel.router();
            match router.resolve(path, &method) {
                Some(found) => {
                    let params: Map<String, Value> = found.values().into_iter().collect();
                    let report = json!({
                        "route": found.route.pattern,
                        "controller": found.route.controller.describe(),
                        "alias": found.route.alias,
                        "params": params,
                    });
                    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
                }
                None => {
                    let allowed = router.allowed_methods(path);
                    if allowed.is_empty() {
                        anyhow::bail!("no route matches {method} {path}");
                    }
                    anyhow::bail!(
                        "{method} not allowed for {path}, allowed: {}",
                        allowed.join(", ")
                    );
                }
            }
        }
        Commands::Url { alias, params } => {
            let params: Vec<(String, Value)> = parse_pairs(params, '=')?
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            writeln!(out, "{}", kernel.url(alias, &params)?)?;
        }
        Commands::Mock {
            expr,
            body,
            headers,
            head,
        } => {
            let headers = parse_pairs(headers, ':')?;
            let headers: Vec<(&str, &str)> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let response = kernel.mock_with(expr, body.as_deref(), &[], &headers);
            out.write_all(&response.to_wire(*head))?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Parse the process arguments and run the command against stdout.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

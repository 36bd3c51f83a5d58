//! Unit tests for CLI commands

use crate::cli::{execute, Cli, Commands};
use clap::Parser;
use std::io::Write;

fn config_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        r#"
routes:
  - route: "GET home /"
    controller: "Home->index"
  - route: "GET post /posts/@id:digit"
    controller: "Post->show"
"#
    )
    .unwrap();
    file
}

fn run(args: &[&str]) -> anyhow::Result<String> {
    let cli = Cli::try_parse_from(args)?;
    let mut out = Vec::new();
    execute(&cli, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn test_parse_mock_command() {
    let cli = Cli::try_parse_from(["stick", "mock", "GET /x", "-H", "Accept: text/html", "--head"]).unwrap();
    assert_eq!(
        cli.command,
        Commands::Mock {
            expr: "GET /x".into(),
            body: None,
            headers: vec!["Accept: text/html".into()],
            head: true,
        }
    );
}

#[test]
fn test_routes_lists_config_routes() {
    let file = config_file();
    let path = file.path().to_str().unwrap();
    let out = run(&["stick", "--config", path, "routes"]).unwrap();
    assert!(out.contains("Home->index"));
    assert!(out.contains("Post->show"));
}

#[test]
fn test_resolve_and_url() {
    let file = config_file();
    let path = file.path().to_str().unwrap();

    let out = run(&["stick", "--config", path, "resolve", "get", "/posts/4"]).unwrap();
    assert!(out.contains("\"controller\": \"Post->show\""));

    let out = run(&["stick", "--config", path, "url", "post", "id=4"]).unwrap();
    assert_eq!(out.trim(), "/posts/4");

    assert!(run(&["stick", "--config", path, "resolve", "GET", "/nope"]).is_err());
}

#[test]
fn test_mock_uses_echo_controller() {
    let file = config_file();
    let path = file.path().to_str().unwrap();
    let out = run(&["stick", "--config", path, "mock", "GET post(id=9)"]).unwrap();
    assert!(out.starts_with("HTTP/1.1 200 OK"));
    assert!(out.contains("\"controller\":\"Post->show\""));
}

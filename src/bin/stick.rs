use stick_dispatch::cli::run_cli;
use stick_dispatch::logging::{init_logging_with_config, LogConfig};

fn main() -> anyhow::Result<()> {
    let mut log_config = LogConfig::from_env();
    // stdout carries command output
    log_config.stderr = true;
    if std::env::var("STICK_LOG_LEVEL").is_err() {
        log_config.log_level = "warn".to_string();
    }
    let _guard = init_logging_with_config(&log_config)?;
    run_cli()
}

//! klipperstat CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use klipperstat_client::cli::{Cli, Command, ConfigAction};
use klipperstat_client::commands;
use klipperstat_client::config::ClientConfig;
use klipperstat_client::error::{ClientError, ClientResult};
use klipperstat_client::shutdown::SignalHandler;
use klipperstat_core::{StatusFormatter, TracingConfig, init_tracing};

// Single-threaded so the scoped tracing subscriber covers every task.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    let _tracing = match init_tracing(tracing_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
    .map_err(ClientError::Config)?;
    cli.apply_to(&mut config);
    Ok(config)
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    let format = cli.output_format(&config);
    let formatter = StatusFormatter::new(format);

    let command = match cli.command.unwrap_or(Command::Status) {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
                ConfigAction::Validate => commands::config::validate(&config),
                ConfigAction::Path => commands::config::path(cli.config.as_deref()),
            };
        }
        Command::Discover => return commands::discover::run(&config, format),
        command => command,
    };

    let signals = SignalHandler::new();
    signals
        .spawn_listener()
        .map_err(|e| ClientError::config(format!("failed to install signal handlers: {}", e)))?;
    let shutdown = signals.shutdown_handle();
    let orchestrator = commands::orchestrator(&config, shutdown.clone())?;
    let query = config.status_query();

    match command {
        Command::Watch => commands::watch::run(&orchestrator, &query, &formatter, &shutdown).await,
        Command::Objects => commands::objects::run(&orchestrator, &formatter).await,
        _ => commands::status::run(&orchestrator, &query, &formatter).await,
    }
}

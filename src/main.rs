//! procwork - Main entry point.
//!
//! Runs a stored procedure against the configured database and prints its
//! result sets and output parameters as JSON, or stores a SQLite procedure
//! script.

use clap::Parser;
use procwork::config::{Action, Config};
use procwork::mapping::ResultSets;
use procwork::models::{Command, DbValue};
use procwork::{CancellationToken, DataAccess, DbError, DbResult};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[derive(Debug, Serialize)]
struct CallOutput {
    procedure: String,
    result_sets: Vec<procwork::ResultSet>,
    outputs: serde_json::Map<String, serde_json::Value>,
}

fn build_command(
    procedure: &str,
    params: &[(String, String)],
    outputs: &[String],
    timeout: Option<u64>,
) -> Command {
    let mut command = Command::new(procedure);
    for (name, raw) in params {
        command = command.with_param(name, DbValue::parse_literal(raw));
    }
    for name in outputs {
        command = command.with_output(name);
    }
    if let Some(secs) = timeout {
        command = command.with_timeout(Duration::from_secs(secs));
    }
    command
}

async fn call(
    access: &DataAccess,
    mut command: Command,
    transactional: bool,
    cancel: &CancellationToken,
) -> DbResult<CallOutput> {
    let result_sets = if transactional {
        let mut uow = access.unit_of_work();
        let result = uow.execute::<ResultSets>(&mut command, cancel).await;
        uow.dispose().await;
        result?
    } else {
        access
            .executor()
            .query_result_sets(&mut command, cancel)
            .await?
    };

    let mut outputs = serde_json::Map::new();
    for param in command.outputs() {
        let value = serde_json::to_value(param.value())
            .map_err(|e| DbError::internal(format!("Failed to serialize output: {}", e)))?;
        outputs.insert(param.name().to_string(), value);
    }

    Ok(CallOutput {
        procedure: command.procedure().to_string(),
        result_sets,
        outputs,
    })
}

async fn define(
    access: &DataAccess,
    name: &str,
    file: &Path,
    cancel: &CancellationToken,
) -> DbResult<()> {
    let body = tokio::fs::read_to_string(file).await.map_err(|e| {
        DbError::invalid_input(format!("Cannot read '{}': {}", file.display(), e))
    })?;
    access.provider().define_procedure(name, &body, cancel).await
}

async fn run(config: &Config, cancel: &CancellationToken) -> DbResult<()> {
    let access = DataAccess::from_config(config)?;

    let result = match &config.command {
        Action::Call {
            procedure,
            params,
            outputs,
            transactional,
            timeout,
        } => {
            let command = build_command(procedure, params, outputs, *timeout);
            call(&access, command, *transactional, cancel)
                .await
                .and_then(|output| {
                    serde_json::to_string_pretty(&output).map_err(|e| {
                        DbError::internal(format!("Failed to serialize result: {}", e))
                    })
                })
                .map(|json| println!("{}", json))
        }
        Action::Define { name, file } => define(&access, name, file, cancel).await,
    };

    access.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting procwork v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    if let Err(e) = run(&config, &cancel).await {
        error!(error = %e, "procwork failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Suggestion: {}", suggestion);
        }
        return Err(e.into());
    }
    Ok(())
}

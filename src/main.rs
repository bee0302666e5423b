//! `capexec` - run capabilities from the command line
//!
//! Loads the configuration, registers the built-in and demo capabilities
//! and drives them through a shared executor. Ctrl-C cancels whatever is in
//! flight; results are still printed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::Style;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::output::OutputFormatter;
use capexec_core::{
    builtin, CancellationToken, Config, ExecutionContext, ExecutionRequest, Executor, Input,
    Registry, TracingLogger,
};

mod cli;
mod demo;
mod output;

/// One entry of a batch file
#[derive(Debug, Deserialize)]
struct BatchEntry {
    capability: String,
    #[serde(default)]
    input: Input,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    approve: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config_path, mut config, load_warning) = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging.level);
    if let Some(message) = load_warning {
        warn!("{}", message);
    }
    if let Some(n) = cli.max_concurrency {
        config.executor.max_concurrency = n;
    }

    let registry = build_registry(&config);
    let executor = Executor::new(config.executor.clone());
    let formatter = OutputFormatter::new();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::List { json } => {
            let capabilities = registry.list();
            if json {
                formatter.print_definitions(&capabilities)?;
            } else {
                formatter.print_capabilities(&capabilities);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run {
            name,
            input,
            approve,
            timeout,
            agent_id,
            session_id,
        } => {
            let capability = registry.find(&name).with_context(|| {
                format!(
                    "Unknown capability: {}. Available: {}",
                    name,
                    registry.names().join(", ")
                )
            })?;
            let input = parse_input(input.as_deref())?;

            let mut ctx = ExecutionContext::new()
                .with_agent_id(agent_id)
                .with_cancellation(cancel.clone());
            if let Some(session_id) = session_id {
                ctx = ctx.with_session_id(session_id);
            }
            let logger = TracingLogger::new(ctx.agent_id.clone(), ctx.session_id.clone());
            ctx = ctx.with_logger(Arc::new(logger));
            if approve {
                ctx = ctx.approved();
            }

            let mut request = ExecutionRequest::new(capability.clone(), input).with_context(Arc::new(ctx));
            if let Some(secs) = timeout {
                request = request.with_timeout(Duration::from_secs(secs));
            }

            let result = executor.execute(&cancel, request).await;
            formatter.print_result(capability.name(), &result);
            Ok(exit_code(result.success))
        }

        Commands::Batch { file } => {
            let requests = load_batch(&file, &registry, &cancel)?;
            let names: Vec<String> = requests
                .iter()
                .map(|r| r.capability.name().to_string())
                .collect();

            let results = executor.execute_batch(&cancel, requests).await;
            for (name, result) in names.iter().zip(&results) {
                formatter.print_result(name, result);
            }
            Ok(exit_code(results.iter().all(|r| r.success)))
        }

        Commands::Config { path } => {
            if path {
                println!("{}", config_path.display());
            } else {
                formatter.print_config(&config_path, &config)?;
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Version => {
            let blue = Style::new().blue();
            println!(
                "{} v{} ({})",
                blue.apply_to("capexec"),
                env!("CARGO_PKG_VERSION"),
                env!("GIT_HASH")
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// An explicit path must load; the default location falls back to defaults
/// with a warning that is logged once tracing is up.
fn load_config(path: Option<&Path>) -> Result<(PathBuf, Config, Option<String>)> {
    if let Some(path) = path {
        let config = Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        return Ok((path.to_path_buf(), config, None));
    }

    let path = Config::default_path();
    if !path.exists() {
        return Ok((path, Config::default(), None));
    }
    match Config::load(&path) {
        Ok(config) => Ok((path, config, None)),
        Err(e) => {
            let warning = format!("Ignoring config {}: {}", path.display(), e);
            Ok((path, Config::default(), Some(warning)))
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_registry(config: &Config) -> Registry {
    let registry = Registry::new();
    builtin::register_all(&registry, &config.builtins);
    demo::register(&registry);
    registry
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight work");
            cancel.cancel();
        }
    });
}

/// `--input` must be a JSON object; absent means empty input
fn parse_input(raw: Option<&str>) -> Result<Input> {
    let Some(raw) = raw else {
        return Ok(Input::new());
    };
    match serde_json::from_str::<Value>(raw).context("--input must be valid JSON")? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => bail!("--input must be a JSON object, got {}", other),
    }
}

fn load_batch(path: &Path, registry: &Registry, cancel: &CancellationToken) -> Result<Vec<ExecutionRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let entries: Vec<BatchEntry> =
        serde_json::from_str(&content).context("Batch file must be a JSON array of requests")?;

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let capability = registry
                .find(&entry.capability)
                .with_context(|| format!("Entry {}: unknown capability {}", i, entry.capability))?;

            let mut ctx = ExecutionContext::new()
                .with_agent_id("cli")
                .with_cancellation(cancel.clone());
            if entry.approve {
                ctx = ctx.approved();
            }

            let mut request = ExecutionRequest::new(capability, entry.input).with_context(Arc::new(ctx));
            if let Some(secs) = entry.timeout_secs {
                request = request.with_timeout(Duration::from_secs(secs));
            }
            Ok(request)
        })
        .collect()
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

//! `signing-key-renewal` binary
//!
//! Loads configuration, wires the store and issuer, feeds one invocation
//! through the dispatcher and prints the report. Exits non-zero on failure so
//! the trigger's own retry policy applies.

mod cli;
mod logging;
mod wiring;

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use signing_key_renewal::{Invocation, RenewalConfig, Utc};

use crate::cli::{Cli, Command};
use crate::wiring::Runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&logging::LogConfig::from_env())?;

    let config = RenewalConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    match cli.command {
        Command::CheckConfig => check_config(&config, cli.local),
        Command::Handle { event } => handle(&config, cli.local, event.as_deref()).await,
    }
}

fn check_config(config: &RenewalConfig, local: bool) -> anyhow::Result<()> {
    if !local {
        config.validate_remote().context("invalid configuration")?;
    }
    let policy = config.policy()?;
    tracing::info!(
        ttl_minutes = policy.ttl_minutes(),
        local,
        "Configuration is valid"
    );
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

async fn handle(config: &RenewalConfig, local: bool, event: Option<&Path>) -> anyhow::Result<()> {
    let event = read_event(event)?;
    let runtime = Runtime::build(config, local).await?;
    let now = Utc::now();

    if let Ok(invocation) = Invocation::classify(&event, &config.signing_key_secret_id) {
        runtime.prepare(&invocation, now).await?;
    }

    let report = runtime.dispatcher.handle(&event, now).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_event(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        None => return Ok(Value::Null),
        Some(path) if path.as_os_str() == "-" => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read event from stdin")?;
            raw
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event file {}", path.display()))?,
    };

    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&raw).context("event is not valid JSON")
}

// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secretsync CLI
//!
//! Device agent that pulls encrypted secret files from the config server.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use secretsync_core::{Agent, AgentConfig, ApplyReport, SyncError};

#[derive(Parser)]
#[command(name = "secretsync")]
#[command(version, about = "Encrypted secret delivery for unattended devices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding sota.toml and the persisted bundle
    #[arg(long, global = true, env = "SOTA_DIR", default_value = "/var/sota")]
    config_dir: PathBuf,

    /// Directory the secret files are written to
    #[arg(
        long,
        global = true,
        env = "SECRETS_DIR",
        default_value = "/var/run/secrets"
    )]
    secrets_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Check in once and apply a changed config
    CheckIn,

    /// Re-extract the persisted config without contacting the server
    Extract,

    /// Check in forever at a fixed interval
    Daemon {
        /// Seconds between check-ins
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
}

fn log_report(report: &ApplyReport) {
    info!(
        written = ?report.written,
        removed = ?report.removed,
        hooks = ?report.hooks_run,
        "Secrets updated"
    );
}

/// Runs one check-in; an up-to-date device is a success.
fn check_in(agent: &mut Agent) -> Result<(), SyncError> {
    match agent.check_in() {
        Ok(report) => {
            log_report(&report);
            Ok(())
        }
        Err(e) if e.is_not_modified() => {
            info!("{}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("secretsync=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AgentConfig::load(&cli.config_dir, &cli.secrets_dir)
        .with_context(|| format!("Unable to load config from {}", cli.config_dir.display()))?;
    info!(url = %config.config_url, "Using config server");
    let mut agent = Agent::from_config(&config).context("Invalid device configuration")?;

    match cli.command {
        Commands::CheckIn => check_in(&mut agent)?,
        Commands::Extract => {
            let report = agent.extract()?;
            log_report(&report);
        }
        Commands::Daemon { interval } => {
            let interval = Duration::from_secs(interval);
            loop {
                match check_in(&mut agent) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        return Err(e).context("Unable to open device credentials");
                    }
                    Err(e) => error!("Check-in failed: {}", e),
                }
                thread::sleep(interval);
            }
        }
    }

    Ok(())
}

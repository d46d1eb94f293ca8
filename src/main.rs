//! Scheduled Database Backup Agent
//!
//! Runs one backup pipeline per invocation: dump, compress, encrypt, upload,
//! clean up and notify. Meant to be triggered by an external scheduler.

// backup-agent/src/main.rs
mod backup;
mod config;
mod errors;
mod notify;
mod restore;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup agent
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run_app().await {
        Ok(true) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            error!("❌ Backup failed: database dump did not complete.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Cli {
    Run,
    CheckConfig,
    Unpack {
        artifact: PathBuf,
        out: Option<PathBuf>,
    },
}

fn parse_args(args: &[String]) -> Result<Cli> {
    match args.first().map(|s| s.trim()) {
        None | Some("run") | Some("backup") => Ok(Cli::Run),
        Some("check-config") => Ok(Cli::CheckConfig),
        Some("unpack") => {
            let mut artifact = None;
            let mut out = None;
            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                if arg == "--out" {
                    out = Some(PathBuf::from(rest.next().context("--out needs a path")?));
                } else if artifact.is_none() {
                    artifact = Some(PathBuf::from(arg));
                } else {
                    anyhow::bail!("Unexpected argument '{}'", arg);
                }
            }
            Ok(Cli::Unpack {
                artifact: artifact.context("Usage: backup-agent unpack <artifact> [--out <path>]")?,
                out,
            })
        }
        Some(other) => {
            anyhow::bail!("Invalid command '{}'. Expected 'run', 'check-config' or 'unpack'.", other)
        }
    }
}

/// Returns whether the process should exit successfully.
async fn run_app() -> Result<bool> {
    let args: Vec<String> = env::args().skip(1).collect();

    match parse_args(&args)? {
        Cli::Run => {
            let app_config = AppConfig::from_env().context("Invalid configuration")?;
            let report = backup::run_backup_flow(app_config)
                .await
                .context("Backup process failed")?;
            info!(
                "Outcome: {:?}, notification: {:?}",
                report.outcome, report.notification
            );
            Ok(report.succeeded())
        }
        Cli::CheckConfig => {
            let app_config = AppConfig::from_env().context("Invalid configuration")?;
            println!("{:#?}", app_config);
            Ok(true)
        }
        Cli::Unpack { artifact, out } => {
            let secret = env::var("ENCRYPTION_KEY").ok();
            let restored = restore::unpack_artifact(&artifact, secret.as_deref(), out.as_deref())
                .context("Unpack failed")?;
            println!("{}", restored.display());
            Ok(true)
        }
    }
}

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} executable not found in PATH")]
    ToolNotFound { tool: String },

    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Command {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: std::time::Duration,
    },

    #[error("Expected output file was not produced: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Webhook responded with status {0}")]
    WebhookStatus(reqwest::StatusCode),

    #[error("AWS SDK S3 error: {0}")]
    S3Sdk(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

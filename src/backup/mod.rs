pub mod artifact;
pub mod cleanup;
pub mod compression;
pub(crate) mod db_dump;
pub mod encryption;
mod logic;
pub(crate) mod s3_upload;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
pub use logic::{Pipeline, RunOutcome, RunReport, RunState};

/// Public entry point for one scheduled backup run.
///
/// Only configuration wiring can fail here; everything that happens during the
/// run is folded into the returned report.
pub async fn run_backup_flow(app_config: AppConfig) -> Result<RunReport> {
    let pipeline = Pipeline::from_config(app_config)
        .context("Failed to initialise backup pipeline")?;
    let cfg = pipeline.config();
    info!(
        "Compression: {:?}, encryption: {}, upload: {}, webhook: {}, cleanup: {}",
        cfg.compression,
        cfg.encryption
            .as_ref()
            .map_or("off".to_string(), |e| format!("{:?}", e.method)),
        cfg.upload.as_ref().map_or("off", |u| u.bucket.as_str()),
        if cfg.webhook_url.is_some() { "on" } else { "off" },
        cfg.cleanup_enabled
    );
    Ok(pipeline.run().await)
}

// backup-agent/src/backup/logic.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::backup::artifact::{Artifact, dump_path};
use crate::backup::cleanup::{CleanupLedger, CleanupReport};
use crate::backup::compression::compress;
use crate::backup::db_dump::{DumpTool, PgDump, dump_database};
use crate::backup::encryption::{EncryptionMethod, encrypt};
use crate::backup::s3_upload::{UploadOutcome, Uploader, upload_stage};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::notify::webhook::RetryPolicy;
use crate::notify::{Notification, Notifier, NotifyResult, WebhookNotifier, notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Dumping,
    Compressing,
    Encrypting,
    Uploading,
    Cleaning,
    Notifying,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    DumpFailed { reason: String },
    SuccessLocalOnly,
    SuccessUploaded { uri: String },
    SuccessUploadFailed { uri: String, reason: String },
}

impl RunOutcome {
    /// Status word carried by the notification.
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::DumpFailed { .. } => "Failure",
            RunOutcome::SuccessLocalOnly | RunOutcome::SuccessUploaded { .. } => "Success",
            RunOutcome::SuccessUploadFailed { .. } => "Failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunOutcome::DumpFailed { .. } | RunOutcome::SuccessUploadFailed { .. }
        )
    }

    pub fn dump_succeeded(&self) -> bool {
        !matches!(self, RunOutcome::DumpFailed { .. })
    }

    fn headline(&self) -> &'static str {
        match self {
            RunOutcome::DumpFailed { .. } => "Backup failed",
            RunOutcome::SuccessLocalOnly => "Backup completed",
            RunOutcome::SuccessUploaded { .. } => "Backup completed and uploaded",
            RunOutcome::SuccessUploadFailed { .. } => "Backup completed, upload failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// States entered, in order.
    pub states: Vec<RunState>,
    /// Final artifact; `None` when the dump failed.
    pub artifact: Option<Artifact>,
    pub cleanup: CleanupReport,
    pub notification: NotifyResult,
}

impl RunReport {
    /// Only the dump step decides the process exit status.
    pub fn succeeded(&self) -> bool {
        self.outcome.dump_succeeded()
    }
}

pub struct Pipeline {
    config: AppConfig,
    dump_tool: Box<dyn DumpTool>,
    uploader: Option<Uploader>,
    notifier: Option<Box<dyn Notifier>>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        dump_tool: Box<dyn DumpTool>,
        uploader: Option<Uploader>,
        notifier: Option<Box<dyn Notifier>>,
    ) -> Self {
        Pipeline {
            config,
            dump_tool,
            uploader,
            notifier,
        }
    }

    /// Wires the production collaborators: `pg_dump`, the configured object
    /// store and the webhook.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let uploader = config.upload.as_ref().map(Uploader::from_config);
        let notifier = match &config.webhook_url {
            Some(url) => WebhookNotifier::new(url, RetryPolicy::default())?
                .map(|n| Box::new(n) as Box<dyn Notifier>),
            None => None,
        };
        Ok(Self::new(config, Box::new(PgDump), uploader, notifier))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// One complete pipeline invocation. Every exit path goes through cleanup
    /// and notification exactly once.
    pub async fn run_at(&self, started_at: DateTime<Utc>) -> RunReport {
        let cfg = &self.config;
        let mut states = Vec::new();
        let mut ledger = CleanupLedger::new(cfg.cleanup_enabled);
        let raw_path = dump_path(&cfg.host_dump_dir(), started_at);

        info!(
            "🚀 Starting backup of {} on {} (schedule '{}')",
            cfg.database.name, cfg.database.host, cfg.schedule
        );

        enter(&mut states, RunState::Dumping);
        let dumped = dump_database(self.dump_tool.as_ref(), &cfg.database, &raw_path).await;
        ledger.track(&raw_path);

        let (outcome, artifact) = match dumped {
            Err(e) => (
                RunOutcome::DumpFailed {
                    reason: e.to_string(),
                },
                None,
            ),
            Ok(artifact) => {
                enter(&mut states, RunState::Compressing);
                let artifact = compress(artifact, &cfg.compression);
                ledger.track(artifact.path());

                enter(&mut states, RunState::Encrypting);
                let default_method = EncryptionMethod::Gpg;
                let (method, secret) = match &cfg.encryption {
                    Some(enc) => (&enc.method, Some(enc.secret.as_str())),
                    None => (&default_method, None),
                };
                let artifact = encrypt(artifact, method, secret);
                ledger.track(artifact.path());
                let artifact = artifact.into_final();
                info!(
                    "📦 Final artifact {} ({:?})",
                    artifact.path().display(),
                    artifact.stage()
                );

                enter(&mut states, RunState::Uploading);
                let outcome =
                    match upload_stage(self.uploader.as_ref(), &cfg.database.host, &artifact).await {
                        UploadOutcome::NotConfigured => RunOutcome::SuccessLocalOnly,
                        UploadOutcome::Uploaded { uri } => RunOutcome::SuccessUploaded { uri },
                        UploadOutcome::Failed { uri, reason } => {
                            RunOutcome::SuccessUploadFailed { uri, reason }
                        }
                    };
                (outcome, Some(artifact))
            }
        };

        enter(&mut states, RunState::Cleaning);
        debug!("{} file(s) tracked for cleanup", ledger.entries().len());
        let cleanup = ledger.finalize();

        enter(&mut states, RunState::Notifying);
        let message = self.notification_for(&outcome, artifact.as_ref());
        let notification = notify(self.notifier.as_deref(), &message, outcome.is_failure()).await;

        enter(&mut states, RunState::Done);
        if outcome.dump_succeeded() {
            info!("🎉 Backup run finished: {}", outcome.headline());
        } else {
            info!("Backup run finished without a dump");
        }

        RunReport {
            outcome,
            states,
            artifact,
            cleanup,
            notification,
        }
    }

    fn notification_for(&self, outcome: &RunOutcome, artifact: Option<&Artifact>) -> Notification {
        let cfg = &self.config;
        let file = artifact.map(Artifact::file_name).unwrap_or_default();
        let body = match outcome {
            RunOutcome::DumpFailed { reason } => format!(
                "Dump of database {} on {} failed: {}",
                cfg.database.name, cfg.database.host, reason
            ),
            RunOutcome::SuccessLocalOnly => format!("Backup {} created locally", file),
            RunOutcome::SuccessUploaded { uri } => format!("Backup {} uploaded to {}", file, uri),
            RunOutcome::SuccessUploadFailed { uri, reason } => {
                format!("Backup {} could not be uploaded to {}: {}", file, uri, reason)
            }
        };
        Notification {
            subject: format!("{}: {}", cfg.notification_title, outcome.headline()),
            status: outcome.status().to_string(),
            body,
        }
    }
}

fn enter(states: &mut Vec<RunState>, state: RunState) {
    debug!("Entering {:?}", state);
    states.push(state);
}

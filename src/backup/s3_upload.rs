// backup-agent/src/backup/s3_upload.rs
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use tracing::{error, info, warn};

use crate::backup::artifact::Artifact;
use crate::config::{DEFAULT_UPLOAD_TIMEOUT_SECS, UploadBackend, UploadConfig};
use crate::errors::{AppError, Result};
use crate::utils::{find_executable, run_tool_async};

/// Copies a local file to `s3://<bucket>/<key>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, file: &Path, bucket: &str, key: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// `aws s3 cp`, with operator options appended verbatim.
#[derive(Debug, Clone, Default)]
pub struct AwsCli {
    pub extra_options: Vec<String>,
}

impl AwsCli {
    fn command(&self, exe: &Path, file: &Path, bucket: &str, key: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(exe);
        cmd.arg("s3")
            .arg("cp")
            .arg(file)
            .arg(format!("s3://{}/{}", bucket, key))
            .args(&self.extra_options);
        cmd
    }
}

#[async_trait]
impl ObjectStore for AwsCli {
    async fn put(&self, file: &Path, bucket: &str, key: &str) -> Result<()> {
        let exe = find_executable("aws")?;
        run_tool_async("aws", self.command(&exe, file, bucket, key)).await
    }

    fn name(&self) -> &'static str {
        "aws-cli"
    }
}

/// In-process upload through `aws-sdk-s3` (S3 or an S3-compatible endpoint).
#[derive(Debug, Clone)]
pub struct S3Sdk {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub operation_timeout: Duration,
}

impl S3Sdk {
    async fn client(&self) -> s3::Client {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.operation_timeout)
                    .build(),
            );
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id, secret, None, // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(self.endpoint_url.is_some())
            .build();
        s3::Client::from_conf(s3_config)
    }
}

#[async_trait]
impl ObjectStore for S3Sdk {
    async fn put(&self, file: &Path, bucket: &str, key: &str) -> Result<()> {
        let client = self.client().await;
        let body = ByteStream::from_path(file).await.map_err(|e| {
            AppError::S3Sdk(format!("Failed to read {}: {}", file.display(), e))
        })?;

        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::S3Sdk(format!(
                    "Failed to upload {} to s3://{}/{}: {}",
                    file.display(),
                    bucket,
                    key,
                    s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "aws-sdk-s3"
    }
}

/// `{prefix}/{host}/{file name}`
pub fn remote_key(prefix: &str, host: &str, file_name: &str) -> String {
    format!("{}/{}/{}", prefix, host, file_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    NotConfigured,
    Uploaded { uri: String },
    Failed { uri: String, reason: String },
}

pub struct Uploader {
    bucket: String,
    prefix: String,
    store: Box<dyn ObjectStore>,
    timeout: Duration,
}

impl Uploader {
    pub fn from_config(config: &UploadConfig) -> Self {
        let store: Box<dyn ObjectStore> = match config.backend {
            UploadBackend::Cli => Box::new(AwsCli {
                extra_options: config.extra_options.clone(),
            }),
            UploadBackend::Sdk => {
                if !config.extra_options.is_empty() {
                    warn!(
                        "S3_EXTRA_OPTS {:?} are ignored by the sdk upload backend",
                        config.extra_options
                    );
                }
                Box::new(S3Sdk {
                    endpoint_url: config.endpoint_url.clone(),
                    region: config.region.clone(),
                    access_key_id: config.access_key_id.clone(),
                    secret_access_key: config.secret_access_key.clone(),
                    operation_timeout: config.timeout,
                })
            }
        };
        Self::with_store(&config.bucket, &config.prefix, store).with_timeout(config.timeout)
    }

    pub fn with_store(bucket: &str, prefix: &str, store: Box<dyn ObjectStore>) -> Self {
        Uploader {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            store,
            timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uploads the final artifact. Failure is reported, never raised.
    pub async fn upload(&self, host: &str, artifact: &Artifact) -> UploadOutcome {
        let key = remote_key(&self.prefix, host, &artifact.file_name());
        let uri = format!("s3://{}/{}", self.bucket, key);
        if !artifact.is_final() {
            warn!("{} has not been marked final", artifact.path().display());
        }
        info!(
            "☁️ Uploading {} to {} via {}",
            artifact.path().display(),
            uri,
            self.store.name()
        );

        let put = self.store.put(artifact.path(), &self.bucket, &key);
        let result = match tokio::time::timeout(self.timeout, put).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                operation: format!("Upload to {}", uri),
                after: self.timeout,
            }),
        };

        match result {
            Ok(()) => {
                info!("✅ Uploaded {}", uri);
                UploadOutcome::Uploaded { uri }
            }
            Err(e) => {
                error!("❌ Upload to {} failed: {}", uri, e);
                UploadOutcome::Failed {
                    uri,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Upload stage: a no-op when no bucket is configured.
pub async fn upload_stage(
    uploader: Option<&Uploader>,
    host: &str,
    artifact: &Artifact,
) -> UploadOutcome {
    match uploader {
        Some(uploader) => uploader.upload(host, artifact).await,
        None => {
            info!("No S3 bucket configured, keeping backup local only");
            UploadOutcome::NotConfigured
        }
    }
}

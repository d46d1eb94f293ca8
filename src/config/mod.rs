// backup-agent/src/config/mod.rs
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::backup::compression::CompressionMethod;
use crate::backup::encryption::EncryptionMethod;

pub const DEFAULT_BACKUP_DIR: &str = "/dumps";
pub const DEFAULT_S3_PREFIX: &str = "backups";
pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 1800;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

// Unvalidated snapshot of the environment. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub postgres_host: Option<String>,
    pub postgres_port: Option<String>,
    pub postgres_user: Option<String>,
    pub postgres_password: Option<String>,
    pub postgres_db: Option<String>,
    pub notification_title: Option<String>,
    pub schedule: Option<String>,
    pub encryption_key: Option<String>,
    pub encryption_method: Option<String>,
    pub compression: Option<String>,
    pub cleanup: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub s3_extra_opts: Option<String>,
    pub s3_upload_backend: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_upload_timeout: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub webhook_url: Option<String>,
    pub backup_dir: Option<String>,
}

impl RawConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        RawConfig {
            postgres_host: get("POSTGRES_HOST"),
            postgres_port: get("POSTGRES_PORT"),
            postgres_user: get("POSTGRES_USER"),
            postgres_password: get("POSTGRES_PASSWORD"),
            postgres_db: get("POSTGRES_DB"),
            notification_title: get("NOTIFICATION_TITLE"),
            schedule: get("SCHEDULE"),
            encryption_key: get("ENCRYPTION_KEY"),
            encryption_method: get("ENCRYPTION_METHOD"),
            compression: get("COMPRESSION"),
            cleanup: get("CLEANUP"),
            s3_bucket: get("S3_BUCKET"),
            s3_prefix: get("S3_PREFIX"),
            s3_extra_opts: get("S3_EXTRA_OPTS"),
            s3_upload_backend: get("S3_UPLOAD_BACKEND"),
            s3_endpoint: get("S3_ENDPOINT"),
            s3_region: get("S3_REGION"),
            s3_upload_timeout: get("S3_UPLOAD_TIMEOUT"),
            aws_access_key_id: get("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            webhook_url: get("WEBHOOK_URL"),
            backup_dir: get("BACKUP_DIR"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone)]
pub struct EncryptionConfig {
    pub method: EncryptionMethod,
    pub secret: String,
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("method", &self.method)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBackend {
    /// External `aws s3 cp`.
    Cli,
    /// In-process `aws-sdk-s3` client.
    Sdk,
}

#[derive(Clone)]
pub struct UploadConfig {
    pub bucket: String,
    pub prefix: String,
    pub extra_options: Vec<String>,
    pub backend: UploadBackend,
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Upper bound for one upload, covering both backends.
    pub timeout: Duration,
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("extra_options", &self.extra_options)
            .field("backend", &self.backend)
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notification_title: String,
    /// Owned by the external scheduler; only logged here.
    pub schedule: String,
    pub compression: CompressionMethod,
    pub encryption: Option<EncryptionConfig>,
    pub cleanup_enabled: bool,
    pub upload: Option<UploadConfig>,
    pub webhook_url: Option<String>,
    pub backup_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::from_env())
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let host = required(raw.postgres_host, "POSTGRES_HOST")?;
        let port_raw = required(raw.postgres_port, "POSTGRES_PORT")?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|e| invalid("POSTGRES_PORT", &port_raw, e.to_string()))?;
        // The host doubles as a directory and key partition.
        if host.contains('/') {
            return Err(invalid("POSTGRES_HOST", &host, "must not contain '/'"));
        }
        if matches!(host.trim(), "." | "..") {
            return Err(invalid("POSTGRES_HOST", &host, "must not be a relative path component"));
        }

        let database = DatabaseConfig {
            host,
            port,
            user: required(raw.postgres_user, "POSTGRES_USER")?,
            password: required(raw.postgres_password, "POSTGRES_PASSWORD")?,
            name: required(raw.postgres_db, "POSTGRES_DB")?,
        };

        let compression = match raw.compression.as_deref() {
            None => CompressionMethod::None,
            Some(value) => match CompressionMethod::parse(value) {
                CompressionMethod::Unknown(v) => {
                    return Err(invalid("COMPRESSION", &v, "expected none, gzip, bzip2 or xz"));
                }
                method => method,
            },
        };

        let method = match raw.encryption_method.as_deref() {
            None => EncryptionMethod::Gpg,
            Some(value) => match EncryptionMethod::parse(value) {
                EncryptionMethod::Unknown(v) => {
                    return Err(invalid("ENCRYPTION_METHOD", &v, "expected gpg or openssl"));
                }
                method => method,
            },
        };
        let encryption = raw
            .encryption_key
            .map(|secret| EncryptionConfig { method, secret });

        let cleanup_enabled = match raw.cleanup.as_deref() {
            None => true,
            Some(value) => parse_bool(value).ok_or_else(|| invalid("CLEANUP", value, "expected a boolean"))?,
        };

        let upload = match raw.s3_bucket {
            None => None,
            Some(bucket) => {
                let backend = match raw.s3_upload_backend.as_deref().map(str::trim) {
                    None | Some("cli") => UploadBackend::Cli,
                    Some("sdk") => UploadBackend::Sdk,
                    Some(other) => {
                        return Err(invalid("S3_UPLOAD_BACKEND", other, "expected cli or sdk"));
                    }
                };
                let timeout = match raw.s3_upload_timeout.as_deref().map(str::trim) {
                    None => Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
                    Some(value) => match value.parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => {
                            return Err(invalid(
                                "S3_UPLOAD_TIMEOUT",
                                value,
                                "expected a positive number of seconds",
                            ));
                        }
                    },
                };
                let prefix = raw
                    .s3_prefix
                    .map(|p| p.trim_matches('/').to_string())
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string());
                Some(UploadConfig {
                    bucket: bucket.trim().to_string(),
                    prefix,
                    extra_options: raw
                        .s3_extra_opts
                        .map(|opts| opts.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                    backend,
                    endpoint_url: raw.s3_endpoint,
                    region: raw
                        .s3_region
                        .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                    access_key_id: raw.aws_access_key_id,
                    secret_access_key: raw.aws_secret_access_key,
                    timeout,
                })
            }
        };

        let webhook_url = match raw.webhook_url {
            None => None,
            Some(value) => {
                let parsed = Url::parse(value.trim())
                    .map_err(|e| invalid("WEBHOOK_URL", &value, e.to_string()))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid("WEBHOOK_URL", &value, "scheme must be http or https"));
                }
                Some(value.trim().to_string())
            }
        };

        Ok(AppConfig {
            database,
            notification_title: required(raw.notification_title, "NOTIFICATION_TITLE")?,
            schedule: required(raw.schedule, "SCHEDULE")?,
            compression,
            encryption,
            cleanup_enabled,
            upload,
            webhook_url,
            backup_dir: raw
                .backup_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR)),
        })
    }

    /// Directory holding this host's artifacts.
    pub fn host_dump_dir(&self) -> PathBuf {
        self.backup_dir.join(&self.database.host)
    }
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    value.ok_or(ConfigError::Missing(var))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

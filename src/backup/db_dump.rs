// backup-agent/src/backup/db_dump.rs
use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::{error, info};

use crate::backup::artifact::Artifact;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::utils::{find_executable, run_tool};

/// Produces a single dump file at `output` or fails.
#[async_trait]
pub trait DumpTool: Send + Sync {
    async fn dump(&self, database: &DatabaseConfig, output: &Path) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// `pg_dump` in custom format. The password goes through `PGPASSWORD`, never argv.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgDump;

impl PgDump {
    fn command(exe: &Path, database: &DatabaseConfig, output: &Path) -> Command {
        let mut cmd = Command::new(exe);
        cmd.arg("--host")
            .arg(&database.host)
            .arg("--port")
            .arg(database.port.to_string())
            .arg("--username")
            .arg(&database.user)
            .arg("--dbname")
            .arg(&database.name)
            .arg("--format=custom")
            .arg("--no-password")
            .arg("--file")
            .arg(output)
            .env("PGPASSWORD", &database.password);
        cmd
    }
}

#[async_trait]
impl DumpTool for PgDump {
    async fn dump(&self, database: &DatabaseConfig, output: &Path) -> Result<()> {
        let exe = find_executable("pg_dump")?;
        info!("Found pg_dump executable at: {}", exe.display());
        run_tool("pg_dump", Self::command(&exe, database, output), None)
    }

    fn name(&self) -> &'static str {
        "pg_dump"
    }
}

/// Runs the dump tool and returns the raw artifact.
///
/// On error the file at `output` may exist in a partial state; the caller still
/// owns its cleanup.
pub async fn dump_database(
    tool: &dyn DumpTool,
    database: &DatabaseConfig,
    output: &Path,
) -> Result<Artifact> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        "🔍 Dumping database {} on {}:{} to {}",
        database.name,
        database.host,
        database.port,
        output.display()
    );
    if let Err(e) = tool.dump(database, output).await {
        error!("❌ {} failed for database {}: {}", tool.name(), database.name, e);
        return Err(e);
    }
    if !output.exists() {
        error!("❌ {} exited 0 but {} is missing", tool.name(), output.display());
        return Err(AppError::MissingOutput(output.to_path_buf()));
    }

    info!("✅ Database {} dumped to {}", database.name, output.display());
    Ok(Artifact::raw(output))
}

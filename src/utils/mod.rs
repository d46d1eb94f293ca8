use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

/// Finds an executable in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    which(name).map_err(|_| AppError::ToolNotFound {
        tool: name.to_string(),
    })
}

/// Runs an external tool to completion and fails unless it exits 0.
///
/// When `stdin_payload` is given it is written to the child's stdin, which is
/// then closed. This is the only channel secrets are allowed to travel through;
/// they never appear in the argument vector.
pub fn run_tool(tool: &str, mut cmd: Command, stdin_payload: Option<&[u8]>) -> Result<()> {
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());
    cmd.stdin(if stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|source| AppError::Spawn {
        tool: tool.to_string(),
        source,
    })?;

    if let Some(payload) = stdin_payload {
        if let Some(mut stdin) = child.stdin.take() {
            // A tool that exits before reading stdin reports its own failure below.
            if let Err(e) = stdin.write_all(payload) {
                debug!("Writing stdin of {} failed: {}", tool, e);
            }
        }
    }

    let output = child.wait_with_output().map_err(|source| AppError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    check_exit(tool, output)
}

/// Async variant of [`run_tool`] for network-bound tools. The child is killed
/// when the returned future is dropped, so callers can bound it with a timeout.
pub async fn run_tool_async(tool: &str, mut cmd: tokio::process::Command) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd.output().await.map_err(|source| AppError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    check_exit(tool, output)
}

fn check_exit(tool: &str, output: Output) -> Result<()> {
    if !output.status.success() {
        return Err(AppError::Command {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Appends `suffix` to the full file name, e.g. `a.pgdump` + `.gz` -> `a.pgdump.gz`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Removes a trailing `suffix` from the file name, if present.
pub fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    path.to_str()
        .and_then(|s| s.strip_suffix(suffix))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

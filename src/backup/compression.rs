// backup-agent/src/backup/compression.rs
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::backup::artifact::{Artifact, ArtifactStage};
use crate::errors::{AppError, Result};
use crate::utils::{find_executable, run_tool, strip_suffix, with_suffix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    None,
    Gzip,
    Bzip2,
    Xz,
    /// Anything else; the stage passes the artifact through untouched.
    Unknown(String),
}

impl CompressionMethod {
    pub fn parse(selector: &str) -> Self {
        match selector.trim().to_ascii_lowercase().as_str() {
            "" | "none" => CompressionMethod::None,
            "gzip" => CompressionMethod::Gzip,
            "bzip2" => CompressionMethod::Bzip2,
            "xz" => CompressionMethod::Xz,
            _ => CompressionMethod::Unknown(selector.trim().to_string()),
        }
    }

    pub fn tool(&self) -> Option<&'static str> {
        match self {
            CompressionMethod::Gzip => Some("gzip"),
            CompressionMethod::Bzip2 => Some("bzip2"),
            CompressionMethod::Xz => Some("xz"),
            _ => None,
        }
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            CompressionMethod::Gzip => Some(".gz"),
            CompressionMethod::Bzip2 => Some(".bz2"),
            CompressionMethod::Xz => Some(".xz"),
            _ => None,
        }
    }

    /// Recognizes the codec from the last extension of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        [
            CompressionMethod::Gzip,
            CompressionMethod::Bzip2,
            CompressionMethod::Xz,
        ]
        .into_iter()
        .find(|m| {
            m.suffix()
                .zip(path.to_str())
                .is_some_and(|(suffix, p)| p.ends_with(suffix))
        })
    }
}

/// Compresses the artifact at maximum level with the selected external codec.
///
/// The codec replaces `<file>` with `<file><suffix>`. Compression is best effort:
/// on an unknown selector or any tool failure the input artifact is returned.
pub fn compress(artifact: Artifact, method: &CompressionMethod) -> Artifact {
    let (tool, suffix) = match method {
        CompressionMethod::None => {
            debug!("Compression disabled, keeping {}", artifact.path().display());
            return artifact;
        }
        CompressionMethod::Unknown(selector) => {
            warn!(
                "Unknown compression method '{}', skipping compression of {}",
                selector,
                artifact.path().display()
            );
            return artifact;
        }
        m => match (m.tool(), m.suffix()) {
            (Some(tool), Some(suffix)) => (tool, suffix),
            _ => return artifact,
        },
    };

    let output = with_suffix(artifact.path(), suffix);
    info!("🗜 Compressing {} with {}", artifact.path().display(), tool);

    match find_executable(tool) {
        Ok(exe) => {
            let mut cmd = Command::new(exe);
            cmd.arg("-9").arg(artifact.path());
            compress_with(artifact, tool, cmd, &output)
        }
        Err(e) => {
            warn!("Compression failed, keeping uncompressed backup: {}", e);
            artifact
        }
    }
}

/// Runs a prepared compressor that replaces the artifact with `output`.
fn compress_with(artifact: Artifact, tool: &str, cmd: Command, output: &Path) -> Artifact {
    match run_tool(tool, cmd, None) {
        Ok(()) if output.exists() => {
            info!("✅ Compressed backup written to {}", output.display());
            artifact.advance(output.to_path_buf(), ArtifactStage::Compressed)
        }
        Err(e) if output.exists() && !artifact.path().exists() => {
            // gzip exits 2 on warnings after writing a complete file.
            warn!("{} reported '{}' but produced {}", tool, e, output.display());
            artifact.advance(output.to_path_buf(), ArtifactStage::Compressed)
        }
        Ok(()) => {
            warn!(
                "{} exited cleanly but {} does not exist, keeping uncompressed backup",
                tool,
                output.display()
            );
            artifact
        }
        Err(e) => {
            warn!("Compression failed, keeping uncompressed backup: {}", e);
            artifact
        }
    }
}

fn gunzip(input: &Path, output: &Path) -> std::io::Result<()> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(input)?));
    let mut writer = BufWriter::new(File::create(output)?);
    std::io::copy(&mut decoder, &mut writer)?;
    writer.flush()
}

/// Reverses [`compress`] without touching the input; returns the decompressed path.
pub fn decompress(path: &Path) -> Result<PathBuf> {
    let method = CompressionMethod::from_path(path).ok_or_else(|| {
        AppError::InvalidInput(format!("{} has no known compression suffix", path.display()))
    })?;
    let suffix = method.suffix().unwrap_or_default();
    let output = strip_suffix(path, suffix).ok_or_else(|| {
        AppError::InvalidInput(format!("Cannot derive output name for {}", path.display()))
    })?;
    if output.exists() {
        return Err(AppError::InvalidInput(format!(
            "Refusing to overwrite existing file {}",
            output.display()
        )));
    }

    info!("Decompressing {} to {}", path.display(), output.display());
    match method {
        CompressionMethod::Gzip => {
            if let Err(e) = gunzip(path, &output) {
                let _ = std::fs::remove_file(&output);
                return Err(e.into());
            }
        }
        _ => {
            let tool = method.tool().unwrap_or_default();
            let mut cmd = Command::new(find_executable(tool)?);
            cmd.arg("-d").arg("-k").arg(path);
            run_tool(tool, cmd, None)?;
        }
    }

    if !output.exists() {
        return Err(AppError::MissingOutput(output));
    }
    Ok(output)
}

// backup-agent/src/restore/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backup::compression::{CompressionMethod, decompress};
use crate::backup::encryption::{EncryptionMethod, decrypt};

/// Turns a backup artifact back into the plain `pg_dump` file.
///
/// The extension chain is undone outermost first (`.gpg`/`.enc`, then
/// `.gz`/`.bz2`/`.xz`). The input artifact is left untouched; intermediate files
/// are removed. Returns the path of the restored dump.
pub fn unpack_artifact(artifact: &Path, secret: Option<&str>, out: Option<&Path>) -> Result<PathBuf> {
    if !artifact.is_file() {
        anyhow::bail!("Artifact not found: {}", artifact.display());
    }

    let mut current = artifact.to_path_buf();
    let mut intermediate: Option<PathBuf> = None;

    if EncryptionMethod::from_path(&current).is_some() {
        let secret = secret
            .filter(|s| !s.is_empty())
            .context("Artifact is encrypted but ENCRYPTION_KEY is not set")?;
        current = decrypt(&current, secret)
            .with_context(|| format!("Failed to decrypt {}", artifact.display()))?;
        intermediate = Some(current.clone());
    }

    if CompressionMethod::from_path(&current).is_some() {
        let decompressed = decompress(&current)
            .with_context(|| format!("Failed to decompress {}", current.display()));
        if let Some(tmp) = intermediate.take() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!("Could not remove intermediate {}: {}", tmp.display(), e);
            }
        }
        current = decompressed?;
    }

    if current == artifact {
        anyhow::bail!(
            "{} is neither compressed nor encrypted, nothing to unpack",
            artifact.display()
        );
    }

    if let Some(out) = out {
        fs::rename(&current, out).with_context(|| {
            format!("Failed to move {} to {}", current.display(), out.display())
        })?;
        current = out.to_path_buf();
    }

    info!("✅ Unpacked {} to {}", artifact.display(), current.display());
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::artifact::Artifact;
    use crate::backup::compression::compress;
    use crate::backup::encryption::encrypt;
    use crate::utils::find_executable;

    const PAYLOAD: &[u8] = b"PGDMP restore me \x00\xff";

    #[test]
    fn test_unpack_compressed_and_encrypted() -> anyhow::Result<()> {
        if find_executable("gzip").is_err() || find_executable("openssl").is_err() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let raw = dir.path().join("t.pgdump");
        fs::write(&raw, PAYLOAD)?;

        let artifact = compress(Artifact::raw(&raw), &CompressionMethod::Gzip);
        let artifact = encrypt(artifact, &EncryptionMethod::Openssl, Some("s3cr3t"));
        assert_eq!(artifact.file_name(), "t.pgdump.gz.enc");

        let restored = unpack_artifact(artifact.path(), Some("s3cr3t"), None)?;
        assert_eq!(restored, raw);
        assert_eq!(fs::read(&restored)?, PAYLOAD);
        assert!(artifact.path().exists());
        assert!(!dir.path().join("t.pgdump.gz").exists());
        Ok(())
    }

    #[test]
    fn test_encrypted_without_secret_fails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let enc = dir.path().join("t.pgdump.gpg");
        fs::write(&enc, b"ciphertext")?;
        assert!(unpack_artifact(&enc, None, None).is_err());
        assert!(enc.exists());
        Ok(())
    }

    #[test]
    fn test_plain_dump_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let raw = dir.path().join("t.pgdump");
        fs::write(&raw, PAYLOAD)?;
        assert!(unpack_artifact(&raw, None, None).is_err());
        Ok(())
    }
}

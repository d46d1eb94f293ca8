// backup-agent/src/backup/encryption.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info, warn};

use crate::backup::artifact::{Artifact, ArtifactStage};
use crate::errors::{AppError, Result};
use crate::utils::{find_executable, run_tool, strip_suffix, with_suffix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// Symmetric AES-256 via `gpg`, output `<file>.gpg`.
    Gpg,
    /// AES-256-CBC with random salt via `openssl enc`, output `<file>.enc`.
    Openssl,
    Unknown(String),
}

impl EncryptionMethod {
    pub fn parse(selector: &str) -> Self {
        match selector.trim().to_ascii_lowercase().as_str() {
            "gpg" => EncryptionMethod::Gpg,
            "openssl" => EncryptionMethod::Openssl,
            _ => EncryptionMethod::Unknown(selector.trim().to_string()),
        }
    }

    pub fn tool(&self) -> Option<&'static str> {
        match self {
            EncryptionMethod::Gpg => Some("gpg"),
            EncryptionMethod::Openssl => Some("openssl"),
            EncryptionMethod::Unknown(_) => None,
        }
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            EncryptionMethod::Gpg => Some(".gpg"),
            EncryptionMethod::Openssl => Some(".enc"),
            EncryptionMethod::Unknown(_) => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.to_str()?;
        [EncryptionMethod::Gpg, EncryptionMethod::Openssl]
            .into_iter()
            .find(|m| m.suffix().is_some_and(|s| name.ends_with(s)))
    }
}

fn encrypt_command(method: &EncryptionMethod, exe: PathBuf, input: &Path, output: &Path) -> Command {
    let mut cmd = Command::new(exe);
    match method {
        EncryptionMethod::Gpg => {
            cmd.args(["--batch", "--yes", "--quiet", "--no-symkey-cache"])
                .args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"])
                .args(["--symmetric", "--cipher-algo", "AES256", "--output"])
                .arg(output)
                .arg(input);
        }
        _ => {
            cmd.args(["enc", "-aes-256-cbc", "-salt", "-pbkdf2", "-pass", "stdin", "-in"])
                .arg(input)
                .arg("-out")
                .arg(output);
        }
    }
    cmd
}

fn decrypt_command(method: &EncryptionMethod, exe: PathBuf, input: &Path, output: &Path) -> Command {
    let mut cmd = Command::new(exe);
    match method {
        EncryptionMethod::Gpg => {
            cmd.args(["--batch", "--yes", "--quiet", "--no-symkey-cache"])
                .args(["--pinentry-mode", "loopback", "--passphrase-fd", "0", "--output"])
                .arg(output)
                .arg("--decrypt")
                .arg(input);
        }
        _ => {
            cmd.args(["enc", "-d", "-aes-256-cbc", "-pbkdf2", "-pass", "stdin", "-in"])
                .arg(input)
                .arg("-out")
                .arg(output);
        }
    }
    cmd
}

/// The passphrase line written to the tool's stdin.
fn passphrase_line(secret: &str) -> Vec<u8> {
    let mut line = secret.as_bytes().to_vec();
    line.push(b'\n');
    line
}

/// Encrypts the artifact with the configured method.
///
/// The plaintext is only deleted after the tool exited 0 and the ciphertext
/// exists on disk. Any failure returns the original, unencrypted artifact.
pub fn encrypt(artifact: Artifact, method: &EncryptionMethod, secret: Option<&str>) -> Artifact {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        debug!("No encryption key configured, keeping {}", artifact.path().display());
        return artifact;
    };
    let (tool, suffix) = match (method, method.tool(), method.suffix()) {
        (_, Some(tool), Some(suffix)) => (tool, suffix),
        (EncryptionMethod::Unknown(selector), ..) => {
            warn!(
                "Unknown encryption method '{}', leaving {} unencrypted",
                selector,
                artifact.path().display()
            );
            return artifact;
        }
        _ => return artifact,
    };

    let output = with_suffix(artifact.path(), suffix);
    info!("🔐 Encrypting {} with {}", artifact.path().display(), tool);

    match find_executable(tool) {
        Ok(exe) => {
            let cmd = encrypt_command(method, exe, artifact.path(), &output);
            encrypt_with(artifact, tool, cmd, &output, secret)
        }
        Err(e) => {
            error!("❌ Encryption failed, keeping unencrypted backup: {}", e);
            artifact
        }
    }
}

/// Runs a prepared encryptor and accepts `output` only if it exited 0 and
/// the file exists.
fn encrypt_with(artifact: Artifact, tool: &str, cmd: Command, output: &Path, secret: &str) -> Artifact {
    match run_tool(tool, cmd, Some(&passphrase_line(secret))) {
        Ok(()) if output.exists() => {
            if let Err(e) = fs::remove_file(artifact.path()) {
                warn!(
                    "Encrypted backup written but could not remove plaintext {}: {}",
                    artifact.path().display(),
                    e
                );
            }
            info!("✅ Encrypted backup written to {}", output.display());
            artifact.advance(output.to_path_buf(), ArtifactStage::Encrypted)
        }
        outcome => {
            match outcome {
                Ok(()) => error!(
                    "❌ {} exited cleanly but {} does not exist, keeping unencrypted backup",
                    tool,
                    output.display()
                ),
                Err(e) => error!("❌ Encryption failed, keeping unencrypted backup: {}", e),
            }
            if output.exists() {
                if let Err(e) = fs::remove_file(output) {
                    warn!("Could not remove partial {}: {}", output.display(), e);
                }
            }
            artifact
        }
    }
}

/// Reverses [`encrypt`] into a new file next to `path`. The input is never modified.
pub fn decrypt(path: &Path, secret: &str) -> Result<PathBuf> {
    let method = EncryptionMethod::from_path(path).ok_or_else(|| {
        AppError::InvalidInput(format!("{} has no known encryption suffix", path.display()))
    })?;
    let tool = method.tool().unwrap_or_default();
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

    info!("Decrypting {} with {}", path.display(), tool);
    let cmd = decrypt_command(&method, find_executable(tool)?, path, &output);
    if let Err(e) = run_tool(tool, cmd, Some(&passphrase_line(secret))) {
        // openssl leaves garbage behind on a bad key.
        let _ = fs::remove_file(&output);
        return Err(e);
    }
    if !output.exists() {
        return Err(AppError::MissingOutput(output));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = b"PGDMP pretend dump \x00\x01\x02 bytes";

    fn available(method: &EncryptionMethod) -> bool {
        method.tool().is_some_and(|t| find_executable(t).is_ok())
    }

    #[test]
    fn test_parse_and_suffix() {
        assert_eq!(EncryptionMethod::parse("GPG"), EncryptionMethod::Gpg);
        assert_eq!(EncryptionMethod::parse("openssl"), EncryptionMethod::Openssl);
        assert_eq!(
            EncryptionMethod::parse("age"),
            EncryptionMethod::Unknown("age".to_string())
        );
        assert_eq!(
            EncryptionMethod::from_path(Path::new("x.pgdump.gz.enc")),
            Some(EncryptionMethod::Openssl)
        );
        assert_eq!(EncryptionMethod::from_path(Path::new("x.pgdump.gz")), None);
    }

    #[test]
    fn test_commands_read_secret_from_stdin() {
        for method in [EncryptionMethod::Gpg, EncryptionMethod::Openssl] {
            let cmd = encrypt_command(
                &method,
                PathBuf::from("tool"),
                Path::new("in.pgdump"),
                Path::new("in.pgdump.x"),
            );
            let args: Vec<String> = cmd
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            assert!(args.iter().all(|a| !a.contains("s3cr3t")));
            assert!(
                args.contains(&"--passphrase-fd".to_string()) || args.contains(&"stdin".to_string())
            );
        }
    }

    #[test]
    fn test_no_secret_is_noop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.pgdump");
        std::fs::write(&path, PAYLOAD)?;
        for secret in [None, Some("")] {
            let out = encrypt(Artifact::raw(&path), &EncryptionMethod::Gpg, secret);
            assert_eq!(out.path(), path.as_path());
            assert_eq!(out.stage(), ArtifactStage::RawDump);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_method_keeps_plaintext() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.pgdump");
        std::fs::write(&path, PAYLOAD)?;
        let out = encrypt(
            Artifact::raw(&path),
            &EncryptionMethod::Unknown("age".to_string()),
            Some("s3cr3t"),
        );
        assert_eq!(out.path(), path.as_path());
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_round_trip_and_wrong_secret() -> anyhow::Result<()> {
        for method in [EncryptionMethod::Gpg, EncryptionMethod::Openssl] {
            if !available(&method) {
                continue;
            }
            let dir = tempfile::tempdir()?;
            let path = dir.path().join("a.pgdump");
            std::fs::write(&path, PAYLOAD)?;

            let out = encrypt(Artifact::raw(&path), &method, Some("s3cr3t"));
            let suffix = method.suffix().unwrap_or_default();
            assert_eq!(out.path(), with_suffix(&path, suffix));
            assert_eq!(out.stage(), ArtifactStage::Encrypted);
            assert!(!path.exists(), "plaintext removed after confirmed encryption");
            let ciphertext = std::fs::read(out.path())?;
            assert_ne!(ciphertext, PAYLOAD);

            assert!(decrypt(out.path(), "wrong").is_err());
            assert!(!path.exists(), "no partial plaintext left behind");
            assert_eq!(std::fs::read(out.path())?, ciphertext);

            let plain = decrypt(out.path(), "s3cr3t")?;
            assert_eq!(plain, path);
            assert_eq!(std::fs::read(&plain)?, PAYLOAD);
        }
        Ok(())
    }

    #[test]
    fn test_failed_encryption_keeps_source() -> anyhow::Result<()> {
        if !available(&EncryptionMethod::Openssl) {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("missing.pgdump");
        let out = encrypt(Artifact::raw(&path), &EncryptionMethod::Openssl, Some("s3cr3t"));
        assert_eq!(out.path(), path.as_path());
        assert_eq!(out.stage(), ArtifactStage::RawDump);
        assert!(!with_suffix(&path, ".enc").exists());
        Ok(())
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_clean_exit_without_output_keeps_plaintext() -> anyhow::Result<()> {
        if find_executable("sh").is_err() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.pgdump");
        std::fs::write(&path, PAYLOAD)?;
        let output = with_suffix(&path, ".gpg");

        let out = encrypt_with(
            Artifact::raw(&path),
            "gpg",
            sh("cat >/dev/null; exit 0"),
            &output,
            "s3cr3t",
        );
        assert_eq!(out.path(), path.as_path());
        assert_eq!(out.stage(), ArtifactStage::RawDump);
        assert_eq!(std::fs::read(&path)?, PAYLOAD);
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_failed_tool_removes_partial_ciphertext() -> anyhow::Result<()> {
        if find_executable("sh").is_err() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.pgdump");
        std::fs::write(&path, PAYLOAD)?;
        let output = with_suffix(&path, ".gpg");

        let script = format!("cat >/dev/null; echo junk > '{}'; exit 2", output.display());
        let out = encrypt_with(Artifact::raw(&path), "gpg", sh(&script), &output, "s3cr3t");
        assert_eq!(out.stage(), ArtifactStage::RawDump);
        assert!(path.exists());
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_confirmed_output_replaces_plaintext() -> anyhow::Result<()> {
        if find_executable("sh").is_err() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.pgdump");
        std::fs::write(&path, PAYLOAD)?;
        let output = with_suffix(&path, ".gpg");

        let script = format!("cat > '{}'", output.display());
        let out = encrypt_with(Artifact::raw(&path), "gpg", sh(&script), &output, "s3cr3t");
        assert_eq!(out.path(), output.as_path());
        assert_eq!(out.stage(), ArtifactStage::Encrypted);
        assert!(!path.exists());
        Ok(())
    }
}

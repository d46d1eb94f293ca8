// backup-agent/src/backup/cleanup.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Ordered record of every file a run put on disk.
///
/// `finalize` consumes the ledger, so a run can only clean up once.
#[derive(Debug)]
pub struct CleanupLedger {
    entries: Vec<PathBuf>,
    cleanup_enabled: bool,
}

/// What `finalize` did with each tracked file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub already_absent: Vec<PathBuf>,
    pub retained: Option<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CleanupLedger {
    pub fn new(cleanup_enabled: bool) -> Self {
        CleanupLedger {
            entries: Vec::new(),
            cleanup_enabled,
        }
    }

    /// Records `path` if it currently exists. Re-tracking a path is ignored.
    pub fn track(&mut self, path: &Path) {
        if !path.exists() {
            debug!("Not tracking {}, it does not exist", path.display());
            return;
        }
        if self.entries.iter().any(|p| p == path) {
            return;
        }
        debug!("Tracking {} for cleanup", path.display());
        self.entries.push(path.to_path_buf());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Deletes tracked files in creation order.
    ///
    /// With cleanup disabled the last entry, the final artifact, stays on disk.
    pub fn finalize(self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut entries = self.entries;

        if !self.cleanup_enabled {
            report.retained = entries.pop();
            match &report.retained {
                Some(kept) => info!("Cleanup disabled, retaining {}", kept.display()),
                None => info!("Cleanup disabled, no backup file to retain"),
            }
        }

        for path in entries {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("🧹 Removed {}", path.display());
                    report.deleted.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!("{} already removed", path.display());
                    report.already_absent.push(path);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed.push(path);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let p = dir.join(name);
        fs::write(&p, name)?;
        Ok(p)
    }

    #[test]
    fn test_track_skips_missing_and_duplicates() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = touch(dir.path(), "a.pgdump")?;
        let mut ledger = CleanupLedger::new(true);
        ledger.track(&a);
        ledger.track(&a);
        ledger.track(&dir.path().join("never-written"));
        assert_eq!(ledger.entries(), &[a]);
        Ok(())
    }

    #[test]
    fn test_enabled_deletes_everything_and_tolerates_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = touch(dir.path(), "a.pgdump")?;
        let b = touch(dir.path(), "a.pgdump.gz")?;
        let mut ledger = CleanupLedger::new(true);
        ledger.track(&a);
        ledger.track(&b);
        fs::remove_file(&a)?;

        let report = ledger.finalize();
        assert_eq!(report.already_absent, vec![a.clone()]);
        assert_eq!(report.deleted, vec![b.clone()]);
        assert_eq!(report.retained, None);
        assert!(!a.exists() && !b.exists());
        Ok(())
    }

    #[test]
    fn test_disabled_keeps_last_entry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = touch(dir.path(), "a.pgdump")?;
        let b = touch(dir.path(), "a.pgdump.gz")?;
        let c = touch(dir.path(), "a.pgdump.gz.gpg")?;
        let mut ledger = CleanupLedger::new(false);
        for p in [&a, &b, &c] {
            ledger.track(p);
        }

        let report = ledger.finalize();
        assert_eq!(report.retained, Some(c.clone()));
        assert_eq!(report.deleted, vec![a.clone(), b.clone()]);
        assert!(c.exists());
        assert!(!a.exists() && !b.exists());
        Ok(())
    }

    #[test]
    fn test_disabled_with_single_or_no_entry_deletes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = touch(dir.path(), "a.pgdump")?;
        let mut ledger = CleanupLedger::new(false);
        ledger.track(&a);
        let report = ledger.finalize();
        assert_eq!(report.retained, Some(a.clone()));
        assert!(report.deleted.is_empty());
        assert!(a.exists());

        let report = CleanupLedger::new(false).finalize();
        assert_eq!(report, CleanupReport::default());
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Extension of the raw `pg_dump -Fc` output.
pub const DUMP_EXTENSION: &str = ".pgdump";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStage {
    RawDump,
    Compressed,
    Encrypted,
}

/// The single backup file of a run, as it exists after the last completed stage.
///
/// Stages never mutate an artifact in place; they consume it and hand back the
/// successor (or the same value when they pass through).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    stage: ArtifactStage,
    is_final: bool,
}

impl Artifact {
    pub fn raw(path: impl Into<PathBuf>) -> Self {
        Artifact {
            path: path.into(),
            stage: ArtifactStage::RawDump,
            is_final: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> ArtifactStage {
        self.stage
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn advance(self, path: PathBuf, stage: ArtifactStage) -> Self {
        Artifact {
            path,
            stage,
            is_final: false,
        }
    }

    /// Marks the artifact as the one that gets uploaded and retained.
    pub(crate) fn into_final(self) -> Self {
        Artifact {
            is_final: true,
            ..self
        }
    }
}

/// `<dir>/<ISO-8601 timestamp>.pgdump`
pub fn dump_path(dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}{}",
        started_at.format("%Y-%m-%dT%H:%M:%SZ"),
        DUMP_EXTENSION
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dump_path_uses_iso_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
        assert_eq!(
            dump_path(Path::new("/dumps/db"), ts),
            PathBuf::from("/dumps/db/2024-03-09T04:05:06Z.pgdump")
        );
    }

    #[test]
    fn test_advance_resets_final_flag() {
        let a = Artifact::raw("/x/a.pgdump").into_final();
        assert!(a.is_final());
        let b = a.advance(PathBuf::from("/x/a.pgdump.gz"), ArtifactStage::Compressed);
        assert!(!b.is_final());
        assert_eq!(b.stage(), ArtifactStage::Compressed);
        assert_eq!(b.file_name(), "a.pgdump.gz");
    }
}

use super::{newest_match, session_id_prefix, FilePattern, TranscriptFormat, TranscriptRoots};
use crate::error::ValidationError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Finds the transcript file for a session.
///
/// The expected location is derived from the working directory. When that
/// misses (directory moved, symlink target changed, agent launched from a
/// different root) the locator falls back to scanning every project under the
/// tool's root. The scan is the slow path and only runs after a miss.
#[derive(Debug, Clone)]
pub struct SessionLogLocator {
    roots: TranscriptRoots,
}

impl SessionLogLocator {
    pub fn new(roots: TranscriptRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &TranscriptRoots {
        &self.roots
    }

    /// Directory where `workdir`'s transcripts are expected.
    pub fn expected_dir(&self, format: TranscriptFormat, workdir: &Path) -> PathBuf {
        let project_dir = format
            .projects_root(&self.roots)
            .join(format.project_key(workdir));
        format.transcript_dir(&project_dir)
    }

    /// Resolve the transcript for `session_id`.
    ///
    /// `Ok(None)` means no transcript exists anywhere; callers treat that as
    /// "no analytics yet".
    pub fn locate(
        &self,
        format: TranscriptFormat,
        workdir: &Path,
        session_id: &str,
    ) -> Result<Option<PathBuf>, ValidationError> {
        let prefix = session_id_prefix(session_id)?;
        if workdir.as_os_str().is_empty() {
            return Err(ValidationError::MissingWorkdir(workdir.to_path_buf()));
        }

        let pattern = format.file_pattern(prefix);
        let expected = self.expected_dir(format, workdir);

        if let Some((path, _)) = newest_match(&expected, &pattern) {
            return Ok(Some(path));
        }

        tracing::debug!(
            session = prefix,
            expected = %expected.display(),
            "transcript not in expected directory, scanning all projects"
        );
        Ok(self.scan_all_projects(format, &pattern))
    }

    fn scan_all_projects(&self, format: TranscriptFormat, pattern: &FilePattern) -> Option<PathBuf> {
        let root = format.projects_root(&self.roots);
        let entries = fs::read_dir(&root).ok()?;

        let mut newest: Option<(PathBuf, SystemTime)> = None;
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let dir = format.transcript_dir(&entry.path());
            if let Some((path, modified)) = newest_match(&dir, pattern) {
                if newest.as_ref().map_or(true, |(_, t)| modified > *t) {
                    newest = Some((path, modified));
                }
            }
        }

        if let Some((path, _)) = &newest {
            tracing::debug!(path = %path.display(), "transcript found by full scan");
        }
        newest.map(|(path, _)| path)
    }
}

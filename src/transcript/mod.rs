//! Agent transcripts on disk.
//!
//! Each agent tool writes its conversation log under its own root directory,
//! bucketed by a key derived from the project path:
//!
//! ```text
//! ~/.gemini/tmp/<sha256 of project path>/chats/session-<stamp>-<id8>.json
//! ~/.claude/projects/<project path with non-alphanumerics as '-'>/<uuid>.jsonl
//! ```

pub mod claude;
pub mod gemini;
mod locator;
mod parser;

pub use locator::SessionLogLocator;
pub use parser::{parse, TranscriptSummary};

use crate::error::ValidationError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Minimum length of a session id; filenames embed its first 8 characters.
pub const MIN_SESSION_ID_LEN: usize = 8;

/// On-disk transcript formats, one per agent tool that writes transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranscriptFormat {
    Gemini,
    Claude,
}

impl TranscriptFormat {
    /// Directory holding one subdirectory per project.
    pub fn projects_root(&self, roots: &TranscriptRoots) -> PathBuf {
        match self {
            Self::Gemini => gemini::projects_root(&roots.gemini),
            Self::Claude => claude::projects_root(&roots.claude),
        }
    }

    /// Key naming the project's subdirectory.
    pub fn project_key(&self, workdir: &Path) -> String {
        match self {
            Self::Gemini => gemini::project_hash(workdir),
            Self::Claude => claude::project_key(workdir),
        }
    }

    /// Where transcripts live inside a project subdirectory.
    pub fn transcript_dir(&self, project_dir: &Path) -> PathBuf {
        match self {
            Self::Gemini => project_dir.join("chats"),
            Self::Claude => project_dir.to_path_buf(),
        }
    }

    pub fn file_pattern(&self, id_prefix: &str) -> FilePattern {
        match self {
            Self::Gemini => gemini::file_pattern(id_prefix),
            Self::Claude => claude::file_pattern(id_prefix),
        }
    }
}

/// Root configuration directories of the agent tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRoots {
    pub gemini: PathBuf,
    pub claude: PathBuf,
}

impl TranscriptRoots {
    pub fn new(gemini: impl Into<PathBuf>, claude: impl Into<PathBuf>) -> Self {
        Self {
            gemini: gemini.into(),
            claude: claude.into(),
        }
    }

    /// `~/.gemini` and `~/.claude`.
    pub fn from_home() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        Self::new(home.join(".gemini"), home.join(".claude"))
    }
}

/// Absolute, symlink-resolved form of `workdir`.
///
/// Agents key their storage on the resolved path (on macOS `/tmp` is really
/// `/private/tmp`). Paths that cannot be resolved are made absolute and used
/// as-is.
pub fn canonical_project_path(workdir: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(workdir) {
        return resolved;
    }
    if workdir.is_absolute() {
        workdir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(workdir))
            .unwrap_or_else(|_| workdir.to_path_buf())
    }
}

/// Check a session id and return the prefix embedded in filenames.
pub fn session_id_prefix(session_id: &str) -> Result<&str, ValidationError> {
    match session_id.char_indices().nth(MIN_SESSION_ID_LEN - 1) {
        Some((idx, ch)) => Ok(&session_id[..idx + ch.len_utf8()]),
        None => Err(ValidationError::SessionIdTooShort(session_id.to_string())),
    }
}

/// A `<prefix>*<suffix>` filename glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
}

impl FilePattern {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        file_name.len() >= self.prefix.len() + self.suffix.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
    }
}

/// Newest file in `dir` whose name matches `pattern`, by modification time.
///
/// Equal timestamps keep whichever entry the filesystem listed first. A
/// missing or unreadable directory has no matches.
pub fn newest_match(dir: &Path, pattern: &FilePattern) -> Option<(PathBuf, SystemTime)> {
    let entries = fs::read_dir(dir).ok()?;

    let mut newest: Option<(PathBuf, SystemTime)> = None;
    for entry in entries.flatten() {
        let matched = entry
            .file_name()
            .to_str()
            .is_some_and(|name| pattern.matches(name));
        if !matched {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };

        if newest.as_ref().map_or(true, |(_, t)| modified > *t) {
            newest = Some((entry.path(), modified));
        }
    }
    newest
}

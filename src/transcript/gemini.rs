//! Gemini CLI session files.
//!
//! Layout: `~/.gemini/tmp/<project_hash>/chats/session-<stamp>-<id8>.json`,
//! where `project_hash` is the lowercase hex SHA-256 of the resolved project
//! path. Field names are camelCase.

use super::parser::{parse_timestamp, read_transcript, TranscriptSummary};
use super::{canonical_project_path, FilePattern};
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Message type the Gemini CLI uses for model turns.
const AGENT_MESSAGE_TYPE: &str = "gemini";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    messages: Option<Vec<RawMessage>>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens: Option<RawTokens>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTokens {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
}

/// Metadata for one session file, as shown in session pickers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSessionInfo {
    /// Full UUID
    pub session_id: String,
    /// e.g. session-2025-12-26T15-09-4d8fcb4d.json
    pub filename: String,
    pub start_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub message_count: usize,
}

pub fn projects_root(gemini_root: &Path) -> PathBuf {
    gemini_root.join("tmp")
}

/// SHA-256 of the resolved project path, as lowercase hex.
pub fn project_hash(workdir: &Path) -> String {
    let resolved = canonical_project_path(workdir);
    let mut hasher = Sha256::new();
    hasher.update(resolved.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// `<root>/tmp/<hash>/chats`
pub fn sessions_dir(gemini_root: &Path, workdir: &Path) -> PathBuf {
    projects_root(gemini_root)
        .join(project_hash(workdir))
        .join("chats")
}

pub fn file_pattern(id_prefix: &str) -> FilePattern {
    FilePattern::new("session-", format!("-{id_prefix}.json"))
}

pub fn parse_file(path: &Path) -> Result<TranscriptSummary, ParseError> {
    let content = read_transcript(path)?;
    parse_str(&content, path)
}

/// Parse a session file's contents; `path` is only used in errors.
pub fn parse_str(content: &str, path: &Path) -> Result<TranscriptSummary, ParseError> {
    let raw: RawSession = serde_json::from_str(content).map_err(|source| ParseError::Json {
        path: path.to_path_buf(),
        line: source.line(),
        source,
    })?;

    let messages = raw.messages.unwrap_or_default();
    let mut summary = TranscriptSummary {
        session_id: raw.session_id.unwrap_or_default(),
        start_time: raw.start_time.as_deref().and_then(parse_timestamp),
        last_updated: raw.last_updated.as_deref().and_then(parse_timestamp),
        message_count: messages.len(),
        ..Default::default()
    };

    for msg in messages
        .iter()
        .filter(|m| m.kind.as_deref() == Some(AGENT_MESSAGE_TYPE))
    {
        let tokens = msg.tokens.as_ref();
        let input = tokens.map_or(0, |t| t.input);
        let output = tokens.map_or(0, |t| t.output);
        summary.record_agent_turn(msg.model.as_deref(), input, output, input);
    }

    Ok(summary)
}

/// All parseable sessions for a project, most recently updated first.
///
/// Malformed files are skipped.
pub fn list_sessions(gemini_root: &Path, workdir: &Path) -> Vec<GeminiSessionInfo> {
    let dir = sessions_dir(gemini_root, workdir);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let pattern = FilePattern::new("session-", ".json");

    let mut sessions: Vec<GeminiSessionInfo> = entries
        .flatten()
        .filter_map(|entry| {
            let filename = entry.file_name().to_str()?.to_string();
            if !pattern.matches(&filename) {
                return None;
            }
            match parse_file(&entry.path()) {
                Ok(summary) => Some(GeminiSessionInfo {
                    session_id: summary.session_id,
                    filename,
                    start_time: summary.start_time,
                    last_updated: summary.last_updated,
                    message_count: summary.message_count,
                }),
                Err(e) => {
                    tracing::debug!("Skipping unreadable Gemini session: {}", e);
                    None
                }
            }
        })
        .collect();

    sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
    sessions
}

/// Pick the session a freshly started instance is running.
///
/// Newest first, skipping ids in `claimed` (held by other instances in the
/// same directory) and, when `not_before` is set, sessions whose last update
/// predates it. A session with no readable `lastUpdated` cannot be placed in
/// time and is skipped whenever `not_before` is set.
pub fn discover_session(
    gemini_root: &Path,
    workdir: &Path,
    claimed: &HashSet<String>,
    not_before: Option<DateTime<Utc>>,
) -> Option<GeminiSessionInfo> {
    list_sessions(gemini_root, workdir)
        .into_iter()
        .filter(|s| !s.session_id.is_empty() && !claimed.contains(&s.session_id))
        .find(|s| match (not_before, s.last_updated) {
            (None, _) => true,
            (Some(start), Some(updated)) => updated >= start,
            (Some(_), None) => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "sessionId": "4d8fcb4d-aaaa-bbbb-cccc-000000000000",
        "startTime": "2025-12-26T15:09:00.000Z",
        "lastUpdated": "2025-12-26T15:39:00.000Z",
        "messages": [
            {"type": "user", "content": "hi"},
            {"type": "gemini", "model": "gemini-2.5-pro", "tokens": {"input": 10, "output": 1}},
            {"type": "user", "content": "more", "tokens": {"input": 999, "output": 999}},
            {"type": "gemini", "model": "gemini-2.5-pro", "tokens": {"input": 20, "output": 2}},
            {"type": "gemini", "model": "gemini-2.5-flash", "tokens": {"input": 30, "output": 3}}
        ]
    }"#;

    #[test]
    fn project_hash_matches_sha256_of_path() {
        // echo -n "/" | shasum -a 256
        assert_eq!(
            project_hash(Path::new("/")),
            "8a5edab282632443219e051e4ade2d1d5bbc671c781051bf1437897cbdfea0f1"
        );
    }

    #[test]
    fn sums_only_agent_turns() {
        let summary = parse_str(SAMPLE, Path::new("s.json")).unwrap();

        assert_eq!(summary.session_id, "4d8fcb4d-aaaa-bbbb-cccc-000000000000");
        assert_eq!(summary.message_count, 5);
        assert_eq!(summary.agent_turns, 3);
        assert_eq!(summary.input_tokens, 60);
        assert_eq!(summary.output_tokens, 6);
        assert_eq!(summary.context_tokens, 30);
        assert_eq!(summary.model.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn bad_timestamps_are_left_unset() {
        let summary = parse_str(
            r#"{"sessionId": "x", "startTime": "soon", "messages": []}"#,
            Path::new("s.json"),
        )
        .unwrap();
        assert_eq!(summary.start_time, None);
        assert_eq!(summary.last_updated, None);
    }

    #[test]
    fn null_fields_parse_as_missing() {
        let summary = parse_str(
            r#"{"sessionId": null, "startTime": null, "lastUpdated": null, "messages": [
                {"type": null, "tokens": null},
                {"type": "gemini", "model": null, "tokens": {"input": 4, "output": 1}}
            ]}"#,
            Path::new("s.json"),
        )
        .unwrap();
        assert_eq!(summary.session_id, "");
        assert_eq!(summary.start_time, None);
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.agent_turns, 1);
        assert_eq!(summary.input_tokens, 4);

        let empty = parse_str(r#"{"messages": null}"#, Path::new("s.json")).unwrap();
        assert_eq!(empty.message_count, 0);
    }

    #[test]
    fn malformed_json_names_the_file() {
        let err = parse_str("{not json", Path::new("/tmp/broken.json")).unwrap_err();
        assert!(err.to_string().contains("/tmp/broken.json"));
    }

    #[test]
    fn list_sessions_sorts_newest_first_and_skips_garbage() {
        let root = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let dir = sessions_dir(root.path(), project.path());
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("session-2025-01-01T10-00-aaaaaaaa.json"),
            r#"{"sessionId": "aaaaaaaa-1", "lastUpdated": "2025-01-01T10:00:00Z", "messages": []}"#,
        )
        .unwrap();
        fs::write(
            dir.join("session-2025-01-02T10-00-bbbbbbbb.json"),
            r#"{"sessionId": "bbbbbbbb-1", "lastUpdated": "2025-01-02T10:00:00Z", "messages": [{"type": "user"}]}"#,
        )
        .unwrap();
        fs::write(dir.join("session-2025-01-03T10-00-cccccccc.json"), "{oops").unwrap();

        let sessions = list_sessions(root.path(), project.path());
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["bbbbbbbb-1", "aaaaaaaa-1"]);
        assert_eq!(sessions[0].message_count, 1);
        assert_eq!(sessions[0].filename, "session-2025-01-02T10-00-bbbbbbbb.json");
    }

    fn write_session(dir: &Path, id: &str, last_updated: &str) {
        fs::write(
            dir.join(format!("session-x-{}.json", &id[..8])),
            format!(r#"{{"sessionId": "{id}", "lastUpdated": "{last_updated}", "messages": []}}"#),
        )
        .unwrap();
    }

    #[test]
    fn discovery_skips_claimed_and_stale_sessions() {
        let root = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let dir = sessions_dir(root.path(), project.path());
        fs::create_dir_all(&dir).unwrap();
        write_session(&dir, "aaaaaaaa-old", "2025-01-01T10:00:00Z");
        write_session(&dir, "bbbbbbbb-mid", "2025-01-02T10:00:00Z");
        write_session(&dir, "cccccccc-new", "2025-01-03T10:00:00Z");

        let none = HashSet::new();
        let found = discover_session(root.path(), project.path(), &none, None).unwrap();
        assert_eq!(found.session_id, "cccccccc-new");

        let claimed: HashSet<String> = ["cccccccc-new".to_string()].into();
        let found = discover_session(root.path(), project.path(), &claimed, None).unwrap();
        assert_eq!(found.session_id, "bbbbbbbb-mid");

        let started = parse_timestamp("2025-01-02T12:00:00Z");
        assert_eq!(
            discover_session(root.path(), project.path(), &claimed, started),
            None
        );
    }
}

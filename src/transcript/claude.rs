//! Claude Code conversation logs.
//!
//! Directory structure:
//! ~/.claude/projects/
//! ├── -home-user-project-path/     # Folder name = path with non-alphanumerics → -
//! │   └── {uuid}.jsonl             # Session conversation log, one record per line

use super::parser::{parse_timestamp, read_transcript, TranscriptSummary};
use super::{canonical_project_path, FilePattern};
use crate::error::ParseError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

pub fn projects_root(claude_root: &Path) -> PathBuf {
    claude_root.join("projects")
}

/// Folder name Claude Code uses for a project: the resolved path with every
/// non-alphanumeric character replaced by `-`.
pub fn project_key(workdir: &Path) -> String {
    canonical_project_path(workdir)
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

pub fn project_dir(claude_root: &Path, workdir: &Path) -> PathBuf {
    projects_root(claude_root).join(project_key(workdir))
}

pub fn file_pattern(id_prefix: &str) -> FilePattern {
    FilePattern::new(id_prefix, ".jsonl")
}

pub fn parse_file(path: &Path) -> Result<TranscriptSummary, ParseError> {
    let content = read_transcript(path)?;
    parse_str(&content, path)
}

/// Parse a JSONL log; `path` is only used in errors.
///
/// Claude streams one assistant message as several records sharing a
/// message id; those count as a single turn. A broken final line is a write
/// still in flight and is ignored.
pub fn parse_str(content: &str, path: &Path) -> Result<TranscriptSummary, ParseError> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    let mut summary = TranscriptSummary::default();
    let mut last_message_id: Option<String> = None;

    for (pos, (idx, line)) in lines.iter().enumerate() {
        let record: RawRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(_) if pos + 1 == lines.len() => {
                tracing::debug!("Ignoring partial last line in {}", path.display());
                break;
            }
            Err(source) => {
                return Err(ParseError::Json {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })
            }
        };

        if summary.session_id.is_empty() {
            if let Some(id) = &record.session_id {
                summary.session_id = id.clone();
            }
        }
        if let Some(ts) = record.timestamp.as_deref().and_then(parse_timestamp) {
            if summary.start_time.is_none() {
                summary.start_time = Some(ts);
            }
            summary.last_updated = Some(ts);
        }

        match record.kind.as_str() {
            "user" => summary.message_count += 1,
            "assistant" => {
                let Some(message) = record.message else {
                    continue;
                };
                if message.id.is_some() && message.id == last_message_id {
                    continue;
                }
                summary.message_count += 1;
                last_message_id = message.id.clone();

                let usage = message.usage.unwrap_or_default();
                let context = usage.input_tokens
                    + usage.cache_read_input_tokens
                    + usage.cache_creation_input_tokens;
                summary.record_agent_turn(
                    message.model.as_deref(),
                    usage.input_tokens,
                    usage.output_tokens,
                    context,
                );
            }
            _ => {}
        }
    }

    Ok(summary)
}

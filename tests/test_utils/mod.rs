//! Test utilities and fixtures for agentdeck tests
#![allow(dead_code)]

use agentdeck::transcript::{claude, gemini};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub use agentdeck::tmux::testing::{FakeMultiplexer, FakeSession};

// =============================================================================
// Transcript fixtures
// =============================================================================

/// Gemini session JSON with one agent turn per `(input, output)` pair,
/// started 45 minutes ago and last updated now.
pub fn gemini_session_json(session_id: &str, turns: &[(u64, u64)]) -> String {
    let now = Utc::now();
    gemini_session_json_at(session_id, turns, now - chrono::Duration::minutes(45), now)
}

pub fn gemini_session_json_at(
    session_id: &str,
    turns: &[(u64, u64)],
    start: DateTime<Utc>,
    last_updated: DateTime<Utc>,
) -> String {
    let mut messages = vec![r#"{"type":"user","content":"go"}"#.to_string()];
    for (input, output) in turns {
        messages.push(format!(
            r#"{{"type":"gemini","model":"gemini-2.5-pro","tokens":{{"input":{input},"output":{output}}}}}"#
        ));
    }
    format!(
        r#"{{"sessionId":"{session_id}","startTime":"{}","lastUpdated":"{}","messages":[{}]}}"#,
        start.to_rfc3339_opts(SecondsFormat::Millis, true),
        last_updated.to_rfc3339_opts(SecondsFormat::Millis, true),
        messages.join(",")
    )
}

/// Write a Gemini session file where the CLI would put it for `workdir`.
pub fn write_gemini_session(
    gemini_root: &Path,
    workdir: &Path,
    stamp: &str,
    session_id: &str,
    content: &str,
) -> PathBuf {
    let dir = gemini::sessions_dir(gemini_root, workdir);
    write_in(&dir, &format!("session-{stamp}-{}.json", &session_id[..8]), content)
}

/// Claude JSONL with one assistant record per `(input, output)` pair.
pub fn claude_session_jsonl(session_id: &str, turns: &[(u64, u64)]) -> String {
    let mut lines = vec![format!(
        r#"{{"type":"user","timestamp":"2025-03-01T09:00:00Z","sessionId":"{session_id}","message":{{"role":"user","content":"go"}}}}"#
    )];
    for (i, (input, output)) in turns.iter().enumerate() {
        lines.push(format!(
            r#"{{"type":"assistant","timestamp":"2025-03-01T09:0{}:00Z","sessionId":"{session_id}","message":{{"id":"msg_{i}","model":"claude-sonnet-4-5","usage":{{"input_tokens":{input},"output_tokens":{output}}}}}}}"#,
            (i + 1) % 10
        ));
    }
    lines.join("\n") + "\n"
}

pub fn write_claude_session(
    claude_root: &Path,
    workdir: &Path,
    session_id: &str,
    content: &str,
) -> PathBuf {
    let dir = claude::project_dir(claude_root, workdir);
    write_in(&dir, &format!("{session_id}.jsonl"), content)
}

pub fn write_in(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, content).unwrap();
    path
}

/// Set a file's modification time to `secs_ago` seconds in the past.
pub fn set_age(path: &Path, secs_ago: u64) -> SystemTime {
    let mtime = SystemTime::now() - Duration::from_secs(secs_ago);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
    mtime
}

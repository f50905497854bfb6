use super::{claude, gemini, TranscriptFormat};
use crate::error::ParseError;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

/// Normalized view of one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptSummary {
    pub session_id: String,
    /// `None` when the transcript's timestamp was missing or unparseable
    pub start_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// All records, user and agent alike
    pub message_count: usize,
    pub agent_turns: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Model of the latest agent turn that named one
    pub model: Option<String>,
    /// Input tokens of the latest agent turn, which includes the history
    pub context_tokens: u64,
}

impl TranscriptSummary {
    pub(crate) fn record_agent_turn(
        &mut self,
        model: Option<&str>,
        input: u64,
        output: u64,
        context: u64,
    ) {
        self.agent_turns += 1;
        self.input_tokens += input;
        self.output_tokens += output;
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.model = Some(model.to_string());
        }
        self.context_tokens = context;
    }
}

/// Parse the transcript at `path` in the given format.
pub fn parse(format: TranscriptFormat, path: &Path) -> Result<TranscriptSummary, ParseError> {
    match format {
        TranscriptFormat::Gemini => gemini::parse_file(path),
        TranscriptFormat::Claude => claude::parse_file(path),
    }
}

pub(crate) fn read_transcript(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Strict RFC 3339 first, then a millisecond variant without offset (read
/// as UTC). Anything else yields `None`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.3f")
        .ok()
        .map(|ts| ts.and_utc())
}

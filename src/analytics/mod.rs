//! Usage analytics derived from agent transcripts.

mod cache;

pub use cache::{AnalyticsCache, RefreshOutcome};

use crate::transcript::TranscriptSummary;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::time::SystemTime;

/// Snapshot of a session's usage, rebuilt from the whole transcript on every
/// reparse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAnalytics {
    pub session_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_turns: u32,
    pub message_count: usize,
    pub model: Option<String>,
    /// Input tokens of the latest agent turn
    pub current_context_tokens: u64,
    /// Transcript this snapshot was built from
    pub source: Option<PathBuf>,
    /// Modification time of `source` when it was parsed
    pub last_file_mod_time: Option<SystemTime>,
}

impl SessionAnalytics {
    pub fn from_summary(summary: TranscriptSummary, source: PathBuf, modified: SystemTime) -> Self {
        Self {
            session_id: summary.session_id,
            start_time: summary.start_time,
            last_active: summary.last_updated,
            input_tokens: summary.input_tokens,
            output_tokens: summary.output_tokens,
            total_turns: summary.agent_turns,
            message_count: summary.message_count,
            model: summary.model,
            current_context_tokens: summary.context_tokens,
            source: Some(source),
            last_file_mod_time: Some(modified),
        }
    }

    /// Time between the first and last recorded activity.
    pub fn duration(&self) -> Option<Duration> {
        let (start, last) = (self.start_time?, self.last_active?);
        (last >= start).then(|| last - start)
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// True until a transcript has been parsed successfully.
    pub fn is_empty(&self) -> bool {
        self.last_file_mod_time.is_none()
    }
}

/// Compact token count for status lines: 950, 12.3k, 1.2M.
pub fn format_tokens(count: u64) -> String {
    match count {
        0..=999 => count.to_string(),
        1_000..=999_999 => format!("{:.1}k", count as f64 / 1_000.0),
        _ => format!("{:.1}M", count as f64 / 1_000_000.0),
    }
}

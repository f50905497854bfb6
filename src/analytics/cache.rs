//! Fingerprint-gated analytics refresh.
//!
//! Parsing a long transcript is the expensive part of a refresh, so the
//! parser only runs when the transcript's modification time differs from the
//! one recorded with the current snapshot.

use super::SessionAnalytics;
use crate::error::AnalyticsError;
use crate::session::Instance;
use crate::transcript::{self, SessionLogLocator, TranscriptFormat};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No transcript to read: the tool writes none, the session id is not
    /// known yet, or no file exists.
    Unavailable,
    /// The transcript has not changed since the last parse.
    Unchanged,
    /// The snapshot was rebuilt from the transcript.
    Updated,
}

#[derive(Debug, Clone)]
pub struct AnalyticsCache {
    locator: SessionLogLocator,
}

impl AnalyticsCache {
    pub fn new(locator: SessionLogLocator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &SessionLogLocator {
        &self.locator
    }

    /// Bring an instance's analytics up to date with its transcript.
    pub fn refresh(&self, instance: &Instance) -> Result<RefreshOutcome, AnalyticsError> {
        let Some(format) = instance.tool().transcript_format() else {
            return Ok(RefreshOutcome::Unavailable);
        };
        let Some(session_id) = instance.tool_session_id() else {
            return Ok(RefreshOutcome::Unavailable);
        };
        self.refresh_slot(
            format,
            instance.workdir(),
            session_id,
            &instance.analytics_handle(),
        )
    }

    /// Refresh one analytics slot.
    ///
    /// The slot's lock is held for the whole call, so concurrent refreshes of
    /// the same session serialize and at most one of them parses a given
    /// file version. A failed parse leaves the previous snapshot in place.
    pub fn refresh_slot(
        &self,
        format: TranscriptFormat,
        workdir: &Path,
        session_id: &str,
        slot: &Mutex<SessionAnalytics>,
    ) -> Result<RefreshOutcome, AnalyticsError> {
        let mut analytics = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(path) = self.locator.locate(format, workdir, session_id)? else {
            return Ok(RefreshOutcome::Unavailable);
        };

        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|source| AnalyticsError::Stat {
                path: path.clone(),
                source,
            })?;

        let same_file = analytics.source.as_deref() == Some(path.as_path());
        if same_file && analytics.last_file_mod_time == Some(modified) {
            tracing::debug!(session = session_id, "transcript unchanged, skipping parse");
            return Ok(RefreshOutcome::Unchanged);
        }

        let summary = transcript::parse(format, &path)?;
        *analytics = SessionAnalytics::from_summary(summary, path, modified);
        tracing::debug!(
            session = session_id,
            turns = analytics.total_turns,
            "analytics updated"
        );
        Ok(RefreshOutcome::Updated)
    }
}

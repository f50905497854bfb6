//! Terminal multiplexer boundary.
//!
//! The multiplexer outlives this process, so anything stored in a session's
//! environment survives an application restart. Instances lean on that to
//! persist their auto-approve flag without a separate state file.

mod client;
#[doc(hidden)]
pub mod testing;

pub use client::TmuxClient;

use crate::error::AdapterError;
use std::path::Path;

/// Operations the engine needs from a terminal multiplexer.
///
/// Every call is a blocking subprocess round trip; keep them off latency
/// sensitive paths.
pub trait Multiplexer: Send + Sync {
    /// Start a detached session running `command` in `workdir`, with `env`
    /// installed into the session environment.
    fn create_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> Result<(), AdapterError>;

    /// Terminate a session. Killing an absent session is not an error.
    fn kill_session(&self, name: &str) -> Result<(), AdapterError>;

    fn has_session(&self, name: &str) -> bool;

    /// Read a session-scoped variable. Unset or removed variables read as `None`.
    fn get_env(&self, name: &str, key: &str) -> Result<Option<String>, AdapterError>;

    fn set_env(&self, name: &str, key: &str, value: &str) -> Result<(), AdapterError>;

    /// Names of all live sessions. No server means no sessions.
    fn list_sessions(&self) -> Result<Vec<String>, AdapterError>;

    /// Argv for attaching a terminal to the session; the caller runs it.
    fn attach_command(&self, name: &str) -> Vec<String>;
}

//! In-memory multiplexer shared by the unit and integration tests.

use super::Multiplexer;
use crate::error::AdapterError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub workdir: PathBuf,
    pub command: String,
    pub env: HashMap<String, String>,
}

/// Multiplexer that keeps sessions in a map and counts calls.
#[derive(Debug, Default)]
pub struct FakeMultiplexer {
    sessions: Mutex<HashMap<String, FakeSession>>,
    fail_set_env: AtomicBool,
    pub create_calls: AtomicUsize,
    pub set_env_calls: AtomicUsize,
}

impl FakeMultiplexer {
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, FakeSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.sessions().get(name).cloned()
    }

    pub fn env(&self, name: &str, key: &str) -> Option<String> {
        self.session(name).and_then(|s| s.env.get(key).cloned())
    }

    /// Insert a session as if another process had created it.
    pub fn seed(&self, name: &str, workdir: &Path, env: &[(&str, &str)]) {
        self.sessions().insert(
            name.to_string(),
            FakeSession {
                workdir: workdir.to_path_buf(),
                command: String::new(),
                env: env
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    /// Drop a session behind the engine's back.
    pub fn vanish(&self, name: &str) {
        self.sessions().remove(name);
    }

    pub fn set_fail_set_env(&self, fail: bool) {
        self.fail_set_env.store(fail, Ordering::SeqCst);
    }
}

fn missing(op: &'static str, name: &str) -> AdapterError {
    AdapterError::CommandFailed {
        op,
        session: name.to_string(),
        stderr: format!("can't find session: {name}"),
    }
}

impl Multiplexer for FakeMultiplexer {
    fn create_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> Result<(), AdapterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions();
        if sessions.contains_key(name) {
            return Err(AdapterError::SessionExists(name.to_string()));
        }
        sessions.insert(
            name.to_string(),
            FakeSession {
                workdir: workdir.to_path_buf(),
                command: command.to_string(),
                env: env.iter().cloned().collect(),
            },
        );
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<(), AdapterError> {
        self.sessions().remove(name);
        Ok(())
    }

    fn has_session(&self, name: &str) -> bool {
        self.sessions().contains_key(name)
    }

    fn get_env(&self, name: &str, key: &str) -> Result<Option<String>, AdapterError> {
        let sessions = self.sessions();
        let session = sessions
            .get(name)
            .ok_or_else(|| missing("show-environment", name))?;
        Ok(session.env.get(key).cloned())
    }

    fn set_env(&self, name: &str, key: &str, value: &str) -> Result<(), AdapterError> {
        self.set_env_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_env.load(Ordering::SeqCst) {
            return Err(missing("set-environment", name));
        }
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(name)
            .ok_or_else(|| missing("set-environment", name))?;
        session.env.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, AdapterError> {
        let mut names: Vec<String> = self.sessions().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn attach_command(&self, name: &str) -> Vec<String> {
        vec![
            "tmux".into(),
            "attach-session".into(),
            "-t".into(),
            format!("={name}"),
        ]
    }
}

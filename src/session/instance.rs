use super::{Tool, TOOL_ENV_KEY, WORKDIR_ENV_KEY};
use crate::analytics::SessionAnalytics;
use crate::error::{InstanceError, ValidationError};
use crate::tmux::Multiplexer;
use crate::transcript::session_id_prefix;
use chrono::{DateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Model ids as the agent CLIs print them, e.g. `gemini-2.5-pro`. The
/// value ends up in a shell command line, so nothing else is accepted.
static MODEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").expect("static pattern compiles"));

/// Lifecycle of an instance's multiplexer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Registered, never started
    Created,
    Running,
    /// Killed, or found gone on the last refresh
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command line and session environment for launching an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Empty for a plain shell
    pub command: String,
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One managed agent session.
///
/// The auto-approve flag lives in two places: `yolo_mode` here and a
/// variable in the tmux session environment. The environment is the source
/// of truth until the first `refresh()` reads it; after that memory is
/// authoritative and every change is written through.
pub struct Instance {
    name: String,
    workdir: PathBuf,
    tool: Tool,
    tmux_name: String,
    yolo_mode: Option<bool>,
    default_yolo: bool,
    /// Model override; `None` lets the agent pick its default
    model: Option<String>,
    tool_session_id: Option<String>,
    status: Status,
    /// The agent conversation has been started at least once
    launched: bool,
    /// Set by `start()`; unknown for recovered sessions
    started_at: Option<DateTime<Utc>>,
    analytics: Arc<Mutex<SessionAnalytics>>,
    adapter: Arc<dyn Multiplexer>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("workdir", &self.workdir)
            .field("tool", &self.tool)
            .field("tmux_name", &self.tmux_name)
            .field("yolo_mode", &self.yolo_mode)
            .field("default_yolo", &self.default_yolo)
            .field("model", &self.model)
            .field("tool_session_id", &self.tool_session_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        workdir: impl Into<PathBuf>,
        tool: Tool,
        tmux_name: impl Into<String>,
        default_yolo: bool,
        adapter: Arc<dyn Multiplexer>,
    ) -> Self {
        Self {
            name: name.into(),
            workdir: workdir.into(),
            tool,
            tmux_name: tmux_name.into(),
            yolo_mode: None,
            default_yolo,
            model: None,
            tool_session_id: None,
            status: Status::Created,
            launched: false,
            started_at: None,
            analytics: Arc::new(Mutex::new(SessionAnalytics::default())),
            adapter,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn tmux_name(&self) -> &str {
        &self.tmux_name
    }

    /// The in-memory flag; `None` until set or read from the session.
    pub fn yolo_mode(&self) -> Option<bool> {
        self.yolo_mode
    }

    pub fn default_yolo(&self) -> bool {
        self.default_yolo
    }

    /// Mode the next launch will use.
    pub fn effective_yolo(&self) -> bool {
        self.tool.supports_yolo() && self.yolo_mode.unwrap_or(self.default_yolo)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// When this process last launched the session, to whole seconds.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn tool_session_id(&self) -> Option<&str> {
        self.tool_session_id.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Copy of the current analytics snapshot.
    pub fn analytics(&self) -> SessionAnalytics {
        self.analytics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared handle to the analytics slot, for the refresher.
    pub fn analytics_handle(&self) -> Arc<Mutex<SessionAnalytics>> {
        Arc::clone(&self.analytics)
    }

    pub fn attach_command(&self) -> Vec<String> {
        self.adapter.attach_command(&self.tmux_name)
    }

    // =========================================================================
    // Mode synchronization
    // =========================================================================

    /// Check a running instance's session still exists, marking the
    /// instance stopped when it does not. Returns whether it is running.
    fn ensure_live(&mut self) -> bool {
        if self.status == Status::Running && !self.adapter.has_session(&self.tmux_name) {
            tracing::info!(instance = %self.name, "session is gone, marking stopped");
            self.status = Status::Stopped;
        }
        self.status == Status::Running
    }

    /// Set the auto-approve flag and write it to the session environment.
    ///
    /// The in-memory flag is updated even when the write fails; the error is
    /// still returned so the caller can surface it. A session that has gone
    /// away is not an error: the instance is marked stopped and the flag
    /// waits for the next launch.
    pub fn set_yolo_mode(&mut self, enabled: bool) -> Result<(), InstanceError> {
        let key = self
            .tool
            .yolo_env_key()
            .ok_or(ValidationError::ModeUnsupported(self.tool.label()))?;

        self.yolo_mode = Some(enabled);
        if !self.ensure_live() {
            tracing::debug!(
                instance = %self.name,
                enabled,
                "mode recorded, will be applied at next launch"
            );
            return Ok(());
        }

        self.adapter
            .set_env(&self.tmux_name, key, bool_str(enabled))
            .map_err(|e| {
                tracing::warn!(instance = %self.name, "failed to persist mode flag: {}", e);
                InstanceError::from(e)
            })
    }

    /// Reconcile with the multiplexer.
    ///
    /// Marks a running instance stopped when its session is gone, then pulls
    /// whatever the session environment knows and memory does not: the mode
    /// flag (absent or unreadable means off) and the agent session id.
    pub fn refresh(&mut self) {
        if !self.ensure_live() {
            return;
        }

        if self.yolo_mode.is_none() {
            if let Some(key) = self.tool.yolo_env_key() {
                let enabled = match self.adapter.get_env(&self.tmux_name, key) {
                    Ok(value) => value.as_deref() == Some("true"),
                    Err(e) => {
                        tracing::debug!(instance = %self.name, "mode flag unreadable: {}", e);
                        false
                    }
                };
                self.yolo_mode = Some(enabled);
            }
        }

        // Only a recovered session can carry a model this process never set.
        if self.model.is_none() && self.started_at.is_none() {
            if let Some(key) = self.tool.model_env_key() {
                if let Ok(Some(model)) = self.adapter.get_env(&self.tmux_name, key) {
                    if MODEL_NAME.is_match(&model) {
                        self.model = Some(model);
                    }
                }
            }
        }

        if self.tool_session_id.is_none() {
            if let Some(key) = self.tool.session_env_key() {
                if let Ok(Some(id)) = self.adapter.get_env(&self.tmux_name, key) {
                    if session_id_prefix(&id).is_ok() {
                        self.tool_session_id = Some(id);
                    }
                }
            }
        }
    }

    /// Record the agent's conversation id and mirror it into the session.
    pub fn set_tool_session_id(&mut self, id: impl Into<String>) -> Result<(), InstanceError> {
        let id = id.into();
        session_id_prefix(&id)?;

        if self.tool_session_id.as_deref() != Some(id.as_str()) {
            *self.analytics.lock().unwrap_or_else(PoisonError::into_inner) =
                SessionAnalytics::default();
        }
        self.tool_session_id = Some(id);

        if self.ensure_live() {
            if let (Some(key), Some(id)) = (self.tool.session_env_key(), &self.tool_session_id) {
                self.adapter.set_env(&self.tmux_name, key, id)?;
            }
        }
        Ok(())
    }

    /// Choose the model for the next launch; `None` or a blank name clears
    /// the override.
    ///
    /// Like the mode flag, the choice is mirrored into the session
    /// environment while running, so a recovered instance keeps it. The
    /// running agent only picks it up after a restart.
    pub fn set_model(&mut self, model: Option<&str>) -> Result<(), InstanceError> {
        if !self.tool.supports_model() {
            return Err(ValidationError::ModelUnsupported(self.tool.label()).into());
        }
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        if let Some(m) = model {
            if !MODEL_NAME.is_match(m) {
                return Err(ValidationError::InvalidModel(m.to_string()).into());
            }
        }

        self.model = model.map(str::to_string);
        if !self.ensure_live() {
            tracing::debug!(instance = %self.name, model = ?self.model, "model recorded for next launch");
            return Ok(());
        }
        if let Some(key) = self.tool.model_env_key() {
            self.adapter
                .set_env(&self.tmux_name, key, self.model.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Program line and session environment for the next launch.
    ///
    /// The auto-approve switch and its environment mirror come from the same
    /// effective value, so the process and the session always agree.
    pub fn launch_command(&self) -> LaunchCommand {
        let yolo = self.effective_yolo();
        let mut parts: Vec<String> = Vec::new();

        if let Some(program) = self.tool.program() {
            parts.push(program.to_string());
            if self.tool == Tool::Claude {
                if let Some(id) = &self.tool_session_id {
                    let flag = if self.launched { "--resume" } else { "--session-id" };
                    parts.push(flag.to_string());
                    parts.push(id.clone());
                }
            }
            if let (Some(flag), Some(model)) = (self.tool.model_flag(), &self.model) {
                parts.push(flag.to_string());
                parts.push(model.clone());
            }
            if yolo {
                if let Some(flag) = self.tool.yolo_flag() {
                    parts.push(flag.to_string());
                }
            }
        }

        let mut env = vec![
            (TOOL_ENV_KEY.to_string(), self.tool.as_str().to_string()),
            (
                WORKDIR_ENV_KEY.to_string(),
                self.workdir.to_string_lossy().into_owned(),
            ),
        ];
        if let Some(key) = self.tool.yolo_env_key() {
            env.push((key.to_string(), bool_str(yolo).to_string()));
        }
        if let (Some(key), Some(id)) = (self.tool.session_env_key(), &self.tool_session_id) {
            env.push((key.to_string(), id.clone()));
        }
        if let (Some(key), Some(model)) = (self.tool.model_env_key(), &self.model) {
            env.push((key.to_string(), model.clone()));
        }

        LaunchCommand {
            command: parts.join(" "),
            env,
        }
    }

    /// Create the multiplexer session. Valid from `Created` or `Stopped`.
    pub fn start(&mut self) -> Result<(), InstanceError> {
        if self.status == Status::Running {
            return Err(ValidationError::InvalidTransition {
                action: "start",
                status: self.status.as_str(),
            }
            .into());
        }
        if !self.workdir.is_dir() {
            return Err(ValidationError::MissingWorkdir(self.workdir.clone()).into());
        }

        let launch = self.launch_command();
        self.adapter
            .create_session(&self.tmux_name, &self.workdir, &launch.command, &launch.env)?;

        self.status = Status::Running;
        self.launched = true;
        self.started_at = Some(Utc::now().trunc_subsecs(0));
        tracing::info!(
            instance = %self.name,
            tool = %self.tool,
            yolo = self.effective_yolo(),
            model = ?self.model,
            "instance started"
        );
        Ok(())
    }

    /// Kill any existing session and launch again with a fresh command.
    pub fn restart(&mut self) -> Result<(), InstanceError> {
        self.adapter.kill_session(&self.tmux_name)?;
        if self.status == Status::Running {
            self.status = Status::Stopped;
        }
        self.start()
    }

    pub fn kill(&mut self) -> Result<(), InstanceError> {
        self.adapter.kill_session(&self.tmux_name)?;
        self.status = Status::Stopped;
        tracing::info!(instance = %self.name, "instance killed");
        Ok(())
    }

    /// Adopt a session that was already running before this process started.
    pub(crate) fn mark_recovered(&mut self) {
        self.status = Status::Running;
        self.launched = true;
        self.started_at = None;
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

use super::{Instance, Status, Tool, TOOL_ENV_KEY, WORKDIR_ENV_KEY};
use crate::analytics::{AnalyticsCache, RefreshOutcome};
use crate::config::Config;
use crate::error::{AdapterError, AnalyticsError, InstanceError, ValidationError};
use crate::tmux::Multiplexer;
use crate::transcript::{gemini, SessionLogLocator};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static pattern compiles"));

/// tmux session name for an instance: `prefix` plus the name with anything
/// outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn tmux_session_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{}", UNSAFE_NAME_CHARS.replace_all(name, "_"))
}

/// Request to register a new instance.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub name: String,
    pub workdir: PathBuf,
    pub tool: Tool,
    /// Explicit mode; `None` follows the global preference for the tool
    pub yolo_mode: Option<bool>,
    /// Model override, for tools that take one
    pub model: Option<String>,
}

/// All instances this process knows about, keyed by name.
pub struct InstanceRegistry {
    adapter: Arc<dyn Multiplexer>,
    config: Config,
    analytics: AnalyticsCache,
    instances: HashMap<String, Instance>,
}

impl InstanceRegistry {
    pub fn new(adapter: Arc<dyn Multiplexer>, config: Config) -> Self {
        let locator = SessionLogLocator::new(config.transcript_roots());
        Self {
            adapter,
            config,
            analytics: AnalyticsCache::new(locator),
            instances: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn analytics_cache(&self) -> &AnalyticsCache {
        &self.analytics
    }

    /// Validate and register an instance. Nothing is launched yet.
    pub fn create(&mut self, request: NewInstance) -> Result<&mut Instance, InstanceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.instances.contains_key(&name) {
            return Err(ValidationError::DuplicateName(name).into());
        }
        if !request.workdir.is_absolute() {
            return Err(ValidationError::RelativeWorkdir(request.workdir).into());
        }
        if !request.workdir.is_dir() {
            return Err(ValidationError::MissingWorkdir(request.workdir).into());
        }

        let tmux_name = tmux_session_name(&self.config.tmux.session_prefix, &name);
        if self.instances.values().any(|i| i.tmux_name() == tmux_name) {
            return Err(ValidationError::DuplicateName(name).into());
        }

        let mut instance = Instance::new(
            name.clone(),
            request.workdir,
            request.tool,
            tmux_name,
            self.config.default_yolo(request.tool),
            Arc::clone(&self.adapter),
        );
        if let Some(enabled) = request.yolo_mode {
            instance.set_yolo_mode(enabled)?;
        }
        if request.model.is_some() {
            instance.set_model(request.model.as_deref())?;
        }
        if request.tool == Tool::Claude {
            instance.set_tool_session_id(uuid::Uuid::new_v4().to_string())?;
        }

        tracing::debug!(instance = %name, tool = %request.tool, "instance registered");
        Ok(self.instances.entry(name).or_insert(instance))
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Instance> {
        self.instances.get_mut(name)
    }

    /// Instances sorted by name.
    pub fn list(&self) -> Vec<&Instance> {
        let mut all: Vec<&Instance> = self.instances.values().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn lookup(&mut self, name: &str) -> Result<&mut Instance, ValidationError> {
        self.instances
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownInstance(name.to_string()))
    }

    /// Kill the session and forget the instance.
    pub fn kill(&mut self, name: &str) -> Result<(), InstanceError> {
        self.lookup(name)?.kill()?;
        self.instances.remove(name);
        Ok(())
    }

    /// Flip the auto-approve mode and return the new value.
    ///
    /// With `restart`, the session is relaunched so the running process
    /// picks the mode up; a failed environment write is then repaired by the
    /// relaunch instead of being reported.
    pub fn toggle_yolo(&mut self, name: &str, restart: bool) -> Result<bool, InstanceError> {
        let instance = self.lookup(name)?;
        let enabled = !instance.effective_yolo();

        match instance.set_yolo_mode(enabled) {
            Err(InstanceError::Validation(e)) => return Err(e.into()),
            Err(e) if !restart => return Err(e),
            _ => {}
        }
        if restart {
            instance.restart()?;
        }
        Ok(enabled)
    }

    /// Change an instance's model. A running instance is relaunched so the
    /// agent picks it up; otherwise the choice waits for the next start.
    pub fn set_model(&mut self, name: &str, model: Option<&str>) -> Result<(), InstanceError> {
        let instance = self.lookup(name)?;
        match instance.set_model(model) {
            Err(InstanceError::Validation(e)) => return Err(e.into()),
            // The relaunch installs the value in the session environment.
            Err(e) => tracing::debug!(instance = name, "model not mirrored before restart: {}", e),
            Ok(()) => {}
        }
        if instance.status() == Status::Running {
            instance.restart()?;
        }
        Ok(())
    }

    /// Reconcile an instance with its session and bring analytics up to date.
    ///
    /// When the transcript cannot be parsed the previous analytics stay in
    /// place and the error is returned.
    pub fn refresh(&mut self, name: &str) -> Result<RefreshOutcome, AnalyticsError> {
        let claimed: HashSet<String> = self
            .instances
            .iter()
            .filter(|(other, _)| other.as_str() != name)
            .filter_map(|(_, i)| i.tool_session_id().map(str::to_string))
            .collect();
        let instance = self
            .instances
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownInstance(name.to_string()))?;
        instance.refresh();

        // Gemini picks its own session id; adopt the newest file no other
        // instance owns that was written since this instance launched.
        if instance.tool() == Tool::Gemini && instance.tool_session_id().is_none() {
            let roots = self.analytics.locator().roots();
            if let Some(found) = gemini::discover_session(
                &roots.gemini,
                instance.workdir(),
                &claimed,
                instance.started_at(),
            ) {
                if let Err(e) = instance.set_tool_session_id(found.session_id) {
                    tracing::warn!(instance = name, "failed to record Gemini session id: {}", e);
                }
            }
        }

        self.analytics.refresh(instance).map_err(|e| {
            tracing::warn!(instance = name, "analytics refresh failed: {}", e);
            e
        })
    }

    /// Rebuild instances from live sessions carrying this registry's prefix.
    ///
    /// Sessions without the tool and workdir markers were not started by us
    /// and are left alone. Returns how many instances were added.
    pub fn recover(&mut self) -> Result<usize, AdapterError> {
        let prefix = self.config.tmux.session_prefix.clone();
        let mut recovered = 0;

        for tmux_name in self.adapter.list_sessions()? {
            let Some(name) = tmux_name.strip_prefix(&prefix) else {
                continue;
            };
            if name.is_empty()
                || self.instances.contains_key(name)
                || self.instances.values().any(|i| i.tmux_name() == tmux_name)
            {
                continue;
            }

            let tool = self
                .adapter
                .get_env(&tmux_name, TOOL_ENV_KEY)
                .ok()
                .flatten()
                .and_then(|t| t.parse::<Tool>().ok());
            let workdir = self
                .adapter
                .get_env(&tmux_name, WORKDIR_ENV_KEY)
                .ok()
                .flatten()
                .map(PathBuf::from);
            let (Some(tool), Some(workdir)) = (tool, workdir) else {
                tracing::debug!(session = %tmux_name, "skipping session without instance markers");
                continue;
            };

            let mut instance = Instance::new(
                name,
                workdir,
                tool,
                tmux_name.clone(),
                self.config.default_yolo(tool),
                Arc::clone(&self.adapter),
            );
            instance.mark_recovered();
            instance.refresh();

            tracing::debug!(instance = name, tool = %tool, "recovered instance");
            self.instances.insert(name.to_string(), instance);
            recovered += 1;
        }

        if recovered > 0 {
            tracing::info!("Recovered {} instance(s) from tmux", recovered);
        }
        Ok(recovered)
    }
}

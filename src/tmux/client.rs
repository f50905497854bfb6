use super::Multiplexer;
use crate::error::AdapterError;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};

/// `Multiplexer` backed by the tmux CLI.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self::with_binary("tmux")
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            tmux_path: path.into(),
        }
    }

    /// Check if the tmux binary can be executed at all
    pub fn is_available(&self) -> bool {
        Command::new(&self.tmux_path)
            .arg("-V")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, op: &'static str, args: &[&str]) -> Result<Output, AdapterError> {
        Command::new(&self.tmux_path)
            .args(args)
            .output()
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => AdapterError::BinaryMissing {
                    binary: self.tmux_path.clone(),
                },
                _ => AdapterError::Io { op, source },
            })
    }

    fn failed(op: &'static str, session: &str, output: &Output) -> AdapterError {
        AdapterError::CommandFailed {
            op,
            session: session.to_string(),
            stderr: stderr_or_status(output),
        }
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact-match target so `foo` never resolves to `foobar`.
fn exact(name: &str) -> String {
    format!("={name}")
}

fn stderr_or_status(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}

/// Parse one line of `tmux show-environment` output for `key`.
///
/// `KEY=value` is a set variable, `-KEY` is one that was removed.
fn parse_env_line(line: &str, key: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.starts_with('-') {
        return None;
    }
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .map(str::to_string)
}

fn is_no_server(stderr: &str) -> bool {
    stderr.contains("no server running")
        || stderr.contains("no sessions")
        || stderr.contains("error connecting")
}

impl Multiplexer for TmuxClient {
    fn create_session(
        &self,
        name: &str,
        workdir: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> Result<(), AdapterError> {
        if self.has_session(name) {
            return Err(AdapterError::SessionExists(name.to_string()));
        }

        let workdir = workdir.to_string_lossy();
        let env_pairs: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut args: Vec<&str> = vec!["new-session", "-d", "-s", name, "-c", &workdir];
        for pair in &env_pairs {
            args.push("-e");
            args.push(pair);
        }
        if !command.is_empty() {
            args.push(command);
        }

        let output = self.run("new-session", &args)?;
        if !output.status.success() {
            let stderr = stderr_or_status(&output);
            if stderr.contains("duplicate session") {
                return Err(AdapterError::SessionExists(name.to_string()));
            }
            return Err(AdapterError::CommandFailed {
                op: "new-session",
                session: name.to_string(),
                stderr,
            });
        }

        tracing::debug!(session = name, "tmux session created");
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<(), AdapterError> {
        let target = exact(name);
        let output = self.run("kill-session", &["kill-session", "-t", &target])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_or_status(&output);
        if stderr.contains("can't find session") || is_no_server(&stderr) {
            tracing::debug!(session = name, "kill of absent session ignored");
            return Ok(());
        }
        Err(AdapterError::CommandFailed {
            op: "kill-session",
            session: name.to_string(),
            stderr,
        })
    }

    fn has_session(&self, name: &str) -> bool {
        let target = exact(name);
        self.run("has-session", &["has-session", "-t", &target])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn get_env(&self, name: &str, key: &str) -> Result<Option<String>, AdapterError> {
        let target = exact(name);
        let output = self.run("show-environment", &["show-environment", "-t", &target, key])?;

        if !output.status.success() {
            let stderr = stderr_or_status(&output);
            if stderr.contains("unknown variable") {
                return Ok(None);
            }
            return Err(AdapterError::CommandFailed {
                op: "show-environment",
                session: name.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().find_map(|line| parse_env_line(line, key)))
    }

    fn set_env(&self, name: &str, key: &str, value: &str) -> Result<(), AdapterError> {
        let target = exact(name);
        let output = self.run(
            "set-environment",
            &["set-environment", "-t", &target, key, value],
        )?;

        if !output.status.success() {
            return Err(Self::failed("set-environment", name, &output));
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, AdapterError> {
        let output = self.run("list-sessions", &["list-sessions", "-F", "#{session_name}"])?;

        if !output.status.success() {
            let stderr = stderr_or_status(&output);
            if is_no_server(&stderr) {
                return Ok(Vec::new());
            }
            return Err(AdapterError::CommandFailed {
                op: "list-sessions",
                session: String::new(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn attach_command(&self, name: &str) -> Vec<String> {
        let in_tmux = std::env::var("TMUX").is_ok();
        let verb = if in_tmux { "switch-client" } else { "attach-session" };
        vec![
            self.tmux_path.clone(),
            verb.to_string(),
            "-t".to_string(),
            exact(name),
        ]
    }
}

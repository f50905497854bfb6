use crate::session::Tool;
use crate::transcript::TranscriptRoots;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tmux: TmuxConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub codex: CodexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    #[serde(default = "default_tmux_binary")]
    pub binary: String,
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}

fn default_session_prefix() -> String {
    "agentdeck_".to_string()
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: default_tmux_binary(),
            session_prefix: default_session_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiConfig {
    /// Start new Gemini sessions with auto-approve on
    #[serde(default)]
    pub yolo_mode: bool,
    /// Overrides ~/.gemini
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub yolo_mode: bool,
    /// Overrides ~/.claude
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodexConfig {
    #[serde(default)]
    pub yolo_mode: bool,
}

impl Config {
    /// Global auto-approve preference applied to new instances of `tool`.
    pub fn default_yolo(&self, tool: Tool) -> bool {
        match tool {
            Tool::Gemini => self.gemini.yolo_mode,
            Tool::Claude => self.claude.yolo_mode,
            Tool::Codex => self.codex.yolo_mode,
            Tool::Shell => false,
        }
    }

    /// Transcript roots, falling back to the tools' home-directory defaults.
    pub fn transcript_roots(&self) -> TranscriptRoots {
        let defaults = TranscriptRoots::from_home();
        TranscriptRoots {
            gemini: self.gemini.config_dir.clone().unwrap_or(defaults.gemini),
            claude: self.claude.config_dir.clone().unwrap_or(defaults.claude),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "agentdeck")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration.
///
/// An explicitly requested file must exist; a missing default file just
/// means "use defaults".
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                anyhow::bail!("Config file not found at {}", p.display());
            }
            p.to_path_buf()
        }
        None => {
            let p = default_config_path()?;
            if !p.exists() {
                tracing::debug!("No config at {}, using defaults", p.display());
                return Ok(Config::default());
            }
            p
        }
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.tmux.binary, "tmux");
        assert_eq!(config.tmux.session_prefix, "agentdeck_");
        assert!(!config.default_yolo(Tool::Gemini));
    }

    #[test]
    fn per_tool_yolo_preference() {
        let config = parse(
            r#"
            [gemini]
            yolo_mode = true

            [claude]
            config_dir = "/opt/claude"
            "#,
        )
        .unwrap();

        assert!(config.default_yolo(Tool::Gemini));
        assert!(!config.default_yolo(Tool::Claude));
        assert!(!config.default_yolo(Tool::Shell));
        assert_eq!(config.transcript_roots().claude, PathBuf::from("/opt/claude"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tmux]\nsession_prefix = \"fleet_\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.tmux.session_prefix, "fleet_");
        assert_eq!(config.tmux.binary, "tmux");
    }
}

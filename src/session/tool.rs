use crate::transcript::TranscriptFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The program an instance hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Plain login shell, no agent
    Shell,
    Claude,
    Gemini,
    Codex,
}

#[derive(Debug, Error)]
#[error("unknown tool '{0}' (expected shell, claude, gemini or codex)")]
pub struct ParseToolError(String);

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Shell, Tool::Claude, Tool::Gemini, Tool::Codex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Codex => "codex",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Shell => "Shell",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
            Self::Codex => "Codex",
        }
    }

    /// Executable launched in the session. `None` leaves tmux to start the
    /// user's default shell.
    pub fn program(&self) -> Option<&'static str> {
        match self {
            Self::Shell => None,
            Self::Claude => Some("claude"),
            Self::Gemini => Some("gemini"),
            Self::Codex => Some("codex"),
        }
    }

    /// Command-line switch that turns on auto-approve.
    pub fn yolo_flag(&self) -> Option<&'static str> {
        match self {
            Self::Shell => None,
            Self::Claude => Some("--dangerously-skip-permissions"),
            Self::Gemini => Some("--yolo"),
            Self::Codex => Some("--dangerously-bypass-approvals-and-sandbox"),
        }
    }

    /// Session environment key that mirrors the auto-approve flag.
    pub fn yolo_env_key(&self) -> Option<&'static str> {
        match self {
            Self::Shell => None,
            Self::Claude => Some("CLAUDE_YOLO_MODE"),
            Self::Gemini => Some("GEMINI_YOLO_MODE"),
            Self::Codex => Some("CODEX_YOLO_MODE"),
        }
    }

    /// Session environment key holding the agent's own conversation id.
    pub fn session_env_key(&self) -> Option<&'static str> {
        match self {
            Self::Claude => Some("CLAUDE_SESSION_ID"),
            Self::Gemini => Some("GEMINI_SESSION_ID"),
            Self::Shell | Self::Codex => None,
        }
    }

    /// Command-line switch that selects the model.
    pub fn model_flag(&self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some("--model"),
            Self::Shell | Self::Claude | Self::Codex => None,
        }
    }

    /// Session environment key that mirrors the selected model.
    pub fn model_env_key(&self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some("GEMINI_MODEL"),
            Self::Shell | Self::Claude | Self::Codex => None,
        }
    }

    pub fn transcript_format(&self) -> Option<TranscriptFormat> {
        match self {
            Self::Claude => Some(TranscriptFormat::Claude),
            Self::Gemini => Some(TranscriptFormat::Gemini),
            Self::Shell | Self::Codex => None,
        }
    }

    pub fn supports_yolo(&self) -> bool {
        self.yolo_flag().is_some()
    }

    pub fn supports_model(&self) -> bool {
        self.model_flag().is_some()
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = ParseToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ParseToolError(s.to_string()))
    }
}

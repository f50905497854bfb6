//! Managed agent sessions: what runs where, and in which mode.

mod instance;
mod registry;
mod tool;

pub use instance::{Instance, LaunchCommand, Status};
pub use registry::{tmux_session_name, InstanceRegistry, NewInstance};
pub use tool::{ParseToolError, Tool};

/// Session environment key recording which tool an instance runs.
pub const TOOL_ENV_KEY: &str = "AGENTDECK_TOOL";

/// Session environment key recording an instance's working directory.
pub const WORKDIR_ENV_KEY: &str = "AGENTDECK_WORKDIR";

//! Local service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How submitted commands are handed back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Run in the background and write echo plus output to the session buffer.
    #[default]
    Buffered,
    /// Run to completion and return stdout, stderr and exit code directly.
    Immediate,
}

/// Configuration for `LocalExecService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Shell to run commands with, e.g. `"bash --noprofile"`. Platform default if unset.
    pub shell: Option<String>,
    pub mode: DispatchMode,
    /// Per-command limit; the process is killed when it is exceeded.
    pub command_timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            mode: DispatchMode::Buffered,
            command_timeout_secs: 300,
        }
    }
}

impl LocalConfig {
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

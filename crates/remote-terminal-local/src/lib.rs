//! Local-process execution service for remote terminal sessions.
//!
//! Provides:
//! - `LocalExecService` - `ExecService` that runs commands through a local shell
//! - Shell detection utilities for Unix and Windows

pub mod config;
pub mod service;
pub mod shell;

pub use config::{DispatchMode, LocalConfig};
pub use service::{LocalError, LocalExecService};
pub use shell::{ShellCommand, ShellError, expand_home, get_shell_command};

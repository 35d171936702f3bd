//! Session registry, polling and transcript reconstruction for remote terminals.
//!
//! Provides:
//! - `SessionManager` - Facade over create/execute/close/list
//! - `Registry` - Table of live terminals and their poller tokens
//! - `Poller` - Per-terminal recurring fetch of remote output
//! - Transcript reconstruction with command-echo suppression

pub mod config;
pub mod manager;
pub mod poller;
pub mod reconstruct;
pub mod registry;

pub use config::{ConfigError, ManagerConfig};
pub use manager::{SessionManager, TerminalError};
pub use poller::{PollOutcome, Poller};
pub use registry::{Registry, SessionHandle, Terminal};

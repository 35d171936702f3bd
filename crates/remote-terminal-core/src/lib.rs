//! Core abstractions for remote terminal session management.
//!
//! This crate provides the fundamental building blocks:
//! - `TranscriptLine` - Typed transcript line (command, output, error)
//! - `ChangeFeed` - Broadcast of terminal changes to subscribers
//! - `ProjectContext` - Connection key the sessions belong to
//! - `ExecService` trait for the remote command-execution backend

pub mod context;
pub mod feed;
pub mod traits;
pub mod transcript;

pub use context::ProjectContext;
pub use feed::{ChangeFeed, TerminalEvent};
pub use traits::{CommandOutput, Dispatch, ExecService, RemoteSession, ServiceError, SessionId};
pub use transcript::{LineKind, TranscriptLine};

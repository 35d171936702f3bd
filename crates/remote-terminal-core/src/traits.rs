//! The remote command-execution service consumed by the session manager.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session identifier, assigned by the execution service.
pub type SessionId = String;

/// A session as reported by the service listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    /// Service-assigned identifier.
    pub id: SessionId,
    /// Human label given at creation.
    pub name: String,
    /// Working directory the session was started in.
    pub path: String,
}

/// Result of a command that ran to completion before the call returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How the service handled a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Accepted; its output shows up in the session content buffer.
    Queued,
    /// Ran synchronously; output is returned directly and never buffered.
    Completed(CommandOutput),
}

/// Service error.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for remote command-execution backends.
///
/// Every call is addressed by the project/connection key plus, where
/// applicable, the session ID the service handed out at creation.
#[async_trait]
pub trait ExecService: Send + Sync {
    /// Allocate a new session rooted at `path`.
    async fn create_session(
        &self,
        key: &str,
        name: &str,
        path: &str,
    ) -> Result<SessionId, ServiceError>;

    /// Submit a command to a session.
    async fn execute_command(
        &self,
        key: &str,
        id: &str,
        command: &str,
    ) -> Result<Dispatch, ServiceError>;

    /// Full output buffer of a session so far.
    async fn get_session_content(&self, key: &str, id: &str) -> Result<String, ServiceError>;

    /// Sessions the service currently holds for `key`.
    async fn list_sessions(&self, key: &str) -> Result<Vec<RemoteSession>, ServiceError>;

    /// Tear down a session.
    async fn close_session(&self, key: &str, id: &str) -> Result<(), ServiceError>;

    /// Working directory the session's shell is currently in.
    ///
    /// Fails when the query command exits nonzero.
    async fn current_dir(&self, key: &str, id: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: ExecService + ?Sized> ExecService for std::sync::Arc<T> {
    async fn create_session(
        &self,
        key: &str,
        name: &str,
        path: &str,
    ) -> Result<SessionId, ServiceError> {
        (**self).create_session(key, name, path).await
    }

    async fn execute_command(
        &self,
        key: &str,
        id: &str,
        command: &str,
    ) -> Result<Dispatch, ServiceError> {
        (**self).execute_command(key, id, command).await
    }

    async fn get_session_content(&self, key: &str, id: &str) -> Result<String, ServiceError> {
        (**self).get_session_content(key, id).await
    }

    async fn list_sessions(&self, key: &str) -> Result<Vec<RemoteSession>, ServiceError> {
        (**self).list_sessions(key).await
    }

    async fn close_session(&self, key: &str, id: &str) -> Result<(), ServiceError> {
        (**self).close_session(key, id).await
    }

    async fn current_dir(&self, key: &str, id: &str) -> Result<String, ServiceError> {
        (**self).current_dir(key, id).await
    }
}

//! Execution service backed by local shell processes.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use remote_terminal_core::{
    CommandOutput, Dispatch, ExecService, RemoteSession, ServiceError, SessionId,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    config::{DispatchMode, LocalConfig},
    shell::{ShellCommand, ShellError, expand_home},
};

/// Local execution error.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<LocalError> for ServiceError {
    fn from(err: LocalError) -> Self {
        match err {
            LocalError::Io(e) => Self::Io(e),
            other => Self::Transport(other.to_string()),
        }
    }
}

struct LocalSession {
    key: String,
    name: String,
    /// Path as given by the caller.
    label: String,
    dir: PathBuf,
    buffer: Mutex<String>,
    /// Serializes commands so their output does not interleave.
    turn: tokio::sync::Mutex<()>,
}

impl LocalSession {
    fn append(&self, text: &str) {
        let mut buffer = self
            .buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        buffer.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            buffer.push('\n');
        }
    }

    fn content(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Runs each command through a local shell in the session directory.
///
/// In buffered mode the command line is written to the session buffer
/// before its output, the way an interactive shell echoes input. Each
/// command is a fresh process, so a `cd` does not carry over.
pub struct LocalExecService {
    config: LocalConfig,
    shell: OnceCell<ShellCommand>,
    sessions: RwLock<HashMap<SessionId, Arc<LocalSession>>>,
}

impl Default for LocalExecService {
    fn default() -> Self {
        Self::new(LocalConfig::default())
    }
}

impl LocalExecService {
    /// Create a new local service.
    #[must_use]
    pub fn new(config: LocalConfig) -> Self {
        Self {
            config,
            shell: OnceCell::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &LocalConfig {
        &self.config
    }

    async fn shell(&self) -> Result<&ShellCommand, LocalError> {
        Ok(self
            .shell
            .get_or_try_init(|| ShellCommand::resolve(self.config.shell.as_deref()))
            .await?)
    }

    fn session(&self, key: &str, id: &str) -> Result<Arc<LocalSession>, ServiceError> {
        self.sessions
            .read()
            .map_err(|e| ServiceError::Transport(e.to_string()))?
            .get(id)
            .filter(|s| s.key == key)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }
}

async fn run_shell(
    shell: &ShellCommand,
    dir: &Path,
    line: &str,
    timeout: Duration,
) -> Result<CommandOutput, LocalError> {
    let mut cmd = shell.command(line);
    cmd.current_dir(dir)
        .env("TERM", "dumb")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(command = %line, ?timeout, "Command timed out");
            return Err(LocalError::TimedOut(timeout));
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

#[async_trait]
impl ExecService for LocalExecService {
    async fn create_session(
        &self,
        key: &str,
        name: &str,
        path: &str,
    ) -> Result<SessionId, ServiceError> {
        let dir = expand_home(path);
        if !dir.is_dir() {
            return Err(ServiceError::InvalidPath(path.to_string()));
        }
        self.shell().await?;

        let id = Uuid::new_v4().to_string();
        let session = LocalSession {
            key: key.to_string(),
            name: name.to_string(),
            label: path.to_string(),
            dir,
            buffer: Mutex::new(String::new()),
            turn: tokio::sync::Mutex::new(()),
        };
        self.sessions
            .write()
            .map_err(|e| ServiceError::Transport(e.to_string()))?
            .insert(id.clone(), Arc::new(session));

        tracing::debug!(session_id = %id, %path, "Local session created");
        Ok(id)
    }

    async fn execute_command(
        &self,
        key: &str,
        id: &str,
        command: &str,
    ) -> Result<Dispatch, ServiceError> {
        let session = self.session(key, id)?;

        let shell = self.shell().await?.clone();
        let timeout = self.config.command_timeout();

        if self.config.mode == DispatchMode::Immediate {
            let _turn = session.turn.lock().await;
            let output = run_shell(&shell, &session.dir, command, timeout).await?;
            return Ok(Dispatch::Completed(output));
        }

        let line = command.to_string();
        tokio::spawn(async move {
            let _turn = session.turn.lock().await;
            session.append(&line);
            match run_shell(&shell, &session.dir, &line, timeout).await {
                Ok(output) => {
                    session.append(&output.stdout);
                    session.append(&output.stderr);
                }
                Err(e) => session.append(&format!("{line}: {e}")),
            }
        });

        Ok(Dispatch::Queued)
    }

    async fn get_session_content(&self, key: &str, id: &str) -> Result<String, ServiceError> {
        Ok(self.session(key, id)?.content())
    }

    async fn list_sessions(&self, key: &str) -> Result<Vec<RemoteSession>, ServiceError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let mut listed: Vec<RemoteSession> = sessions
            .iter()
            .filter(|(_, s)| s.key == key)
            .map(|(id, s)| RemoteSession {
                id: id.clone(),
                name: s.name.clone(),
                path: s.label.clone(),
            })
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn close_session(&self, key: &str, id: &str) -> Result<(), ServiceError> {
        self.session(key, id)?;
        self.sessions
            .write()
            .map_err(|e| ServiceError::Transport(e.to_string()))?
            .remove(id);
        tracing::debug!(session_id = %id, "Local session closed");
        Ok(())
    }

    async fn current_dir(&self, key: &str, id: &str) -> Result<String, ServiceError> {
        let session = self.session(key, id)?;
        let shell = self.shell().await?.clone();
        let query = if cfg!(windows) { "cd" } else { "pwd" };

        let _turn = session.turn.lock().await;
        let output = run_shell(&shell, &session.dir, query, self.config.command_timeout()).await?;
        if output.success() {
            return Ok(output.stdout.trim().to_string());
        }
        let detail = output.stderr.trim();
        Err(ServiceError::Transport(if detail.is_empty() {
            format!("{query} exited with status {}", output.exit_code)
        } else {
            format!("Command failed: {detail}")
        }))
    }
}

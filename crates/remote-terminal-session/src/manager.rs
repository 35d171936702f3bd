//! Session manager for remote terminals.

use std::sync::Arc;

use remote_terminal_core::{
    ChangeFeed, Dispatch, ExecService, ProjectContext, ServiceError, SessionId, TerminalEvent,
    TranscriptLine,
};
use tokio::sync::{RwLock, broadcast};

use crate::{
    config::ManagerConfig,
    poller::Poller,
    reconstruct,
    registry::{Registry, SessionHandle, Terminal},
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Failed to create terminal: {0}")]
    Creation(#[source] ServiceError),
    #[error("Terminal not found: {0}")]
    UnknownSession(SessionId),
    #[error("Terminal already registered: {0}")]
    DuplicateSession(SessionId),
    #[error("Failed to close terminal {id}: {source}")]
    Teardown {
        id: SessionId,
        #[source]
        source: ServiceError,
    },
    #[error("Failed to list terminals: {0}")]
    Listing(#[source] ServiceError),
    #[error("Project {0} was cleared before the terminal was registered")]
    ProjectChanged(String),
    #[error("Failed to read working directory of {id}: {source}")]
    WorkingDirectory {
        id: SessionId,
        #[source]
        source: ServiceError,
    },
}

/// Current project plus a counter bumped every time its terminals are dropped.
struct Scope {
    context: ProjectContext,
    generation: u64,
}

/// Coordinates the registry, pollers and reconstruction for one project.
///
/// All access to terminals goes through this type. Mutations of a single
/// terminal are serialized by its lock; different terminals are
/// independent.
pub struct SessionManager<S>
where
    S: ExecService + 'static,
{
    service: Arc<S>,
    scope: RwLock<Scope>,
    registry: Registry,
    feed: ChangeFeed,
    config: ManagerConfig,
}

impl<S> SessionManager<S>
where
    S: ExecService + 'static,
{
    /// Create a new session manager with default timing.
    #[must_use]
    pub fn new(service: S, context: ProjectContext) -> Self {
        Self::with_config(service, context, ManagerConfig::default())
    }

    /// Create a new session manager.
    #[must_use]
    pub fn with_config(service: S, context: ProjectContext, config: ManagerConfig) -> Self {
        Self {
            service: Arc::new(service),
            scope: RwLock::new(Scope {
                context,
                generation: 0,
            }),
            registry: Registry::new(),
            feed: ChangeFeed::new(),
            config,
        }
    }

    /// The execution service.
    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Polling configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current project context.
    pub async fn context(&self) -> ProjectContext {
        self.scope.read().await.context.clone()
    }

    /// Key of the current project.
    pub async fn project_key(&self) -> String {
        self.scope.read().await.context.key.clone()
    }

    /// Switch to another project. Terminals of the previous one are dropped.
    pub async fn set_project_key(&self, key: impl Into<String>) {
        let key = key.into();
        let mut scope = self.scope.write().await;
        if scope.context.key != key {
            scope.context.key = key;
            self.reset(&mut scope).await;
        }
    }

    /// Drop every terminal without remote teardown.
    ///
    /// Creations and adoptions still waiting on the service when this runs
    /// fail with [`TerminalError::ProjectChanged`] instead of registering.
    pub async fn clear(&self) {
        let mut scope = self.scope.write().await;
        self.reset(&mut scope).await;
    }

    /// Create a terminal and start polling it.
    ///
    /// # Errors
    /// Returns error if the service cannot allocate a session, or if the
    /// project was cleared while it did. Nothing is registered in either
    /// case; a session allocated for a cleared project is closed again.
    pub async fn create_terminal(&self, name: &str, path: &str) -> Result<Terminal, TerminalError> {
        let (key, generation) = self.current_scope().await;
        let id = self
            .service
            .create_session(&key, name, path)
            .await
            .map_err(TerminalError::Creation)?;

        let mut terminal = Terminal::new(id.clone(), name, path);
        terminal.push(TranscriptLine::output(format!(
            "Terminal \"{name}\" started at {path}"
        )));
        let snapshot = terminal.clone();

        let created = TerminalEvent::Created {
            session_id: id.clone(),
        };
        let handle = match self.install(generation, &key, terminal, created).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                tracing::warn!(session_id = %id, "Service returned an ID that is already registered");
                return Err(TerminalError::DuplicateSession(id));
            }
            Err(e) => {
                self.discard_remote(&key, &id).await;
                return Err(e);
            }
        };

        self.poller(handle).spawn(self.config.poll_interval());
        tracing::info!(session_id = %id, %name, %path, "Terminal created");

        Ok(snapshot)
    }

    /// Run a command in a terminal.
    ///
    /// The command is recorded before the service is called. Execution
    /// failures are recorded as error lines and do not fail the call.
    ///
    /// # Errors
    /// Returns error only if the terminal is unknown.
    pub async fn execute_command(&self, id: &str, command: &str) -> Result<(), TerminalError> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| TerminalError::UnknownSession(id.to_string()))?;

        self.append(&handle, vec![TranscriptLine::command(command)])
            .await;

        match self
            .service
            .execute_command(&handle.key, id, command)
            .await
        {
            Ok(Dispatch::Queued) => {
                if let Some(delay) = self.config.echo_poll_delay() {
                    self.poller(handle).spawn_delayed(delay);
                }
            }
            Ok(Dispatch::Completed(output)) => {
                self.append(&handle, reconstruct::completed_lines(&output))
                    .await;
            }
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "Command failed");
                self.append(&handle, vec![TranscriptLine::error(format!("Error: {e}"))])
                    .await;
            }
        }
        Ok(())
    }

    /// Close a terminal.
    ///
    /// The terminal is removed locally even when remote teardown fails.
    /// Closing an unknown terminal is a no-op.
    ///
    /// # Errors
    /// Returns error if the service failed to tear the session down.
    pub async fn close_terminal(&self, id: &str) -> Result<(), TerminalError> {
        let Some(handle) = self.registry.remove(id).await else {
            tracing::debug!(session_id = %id, "Close of unknown terminal ignored");
            return Ok(());
        };
        self.feed.push(TerminalEvent::Closed {
            session_id: id.to_string(),
        });

        self.service
            .close_session(&handle.key, id)
            .await
            .map_err(|source| {
                tracing::warn!(session_id = %id, error = %source, "Remote teardown failed");
                TerminalError::Teardown {
                    id: id.to_string(),
                    source,
                }
            })?;
        tracing::info!(session_id = %id, "Terminal closed");
        Ok(())
    }

    /// Adopt sessions the service holds that are not tracked locally.
    ///
    /// Each adopted terminal is backfilled with one full fetch before its
    /// poller starts. Returns the adopted IDs.
    ///
    /// # Errors
    /// Returns error if the service listing fails, or if the project was
    /// cleared before every session could be adopted.
    pub async fn load_terminals(&self) -> Result<Vec<SessionId>, TerminalError> {
        let (key, generation) = self.current_scope().await;
        let remote = self
            .service
            .list_sessions(&key)
            .await
            .map_err(TerminalError::Listing)?;

        let mut adopted = Vec::new();
        for session in remote {
            let mut terminal = Terminal::new(session.id.clone(), &session.name, &session.path);
            terminal.push(TranscriptLine::output(format!(
                "Terminal \"{}\" reconnected",
                session.name
            )));

            let adopted_event = TerminalEvent::Adopted {
                session_id: session.id.clone(),
            };
            let Some(handle) = self
                .install(generation, &key, terminal, adopted_event)
                .await?
            else {
                continue;
            };

            let poller = self.poller(handle);
            poller.poll_once().await;
            poller.spawn(self.config.poll_interval());

            tracing::info!(session_id = %session.id, name = %session.name, "Terminal adopted");
            adopted.push(session.id);
        }
        Ok(adopted)
    }

    /// Poll a terminal now instead of waiting for its next cycle.
    ///
    /// Returns the number of lines appended.
    ///
    /// # Errors
    /// Returns error if the terminal is unknown.
    pub async fn refresh(&self, id: &str) -> Result<usize, TerminalError> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| TerminalError::UnknownSession(id.to_string()))?;
        Ok(self.poller(handle).poll_once().await.appended())
    }

    /// Ask the service for the live working directory of a terminal.
    ///
    /// `Terminal::path` keeps the directory the terminal was started in;
    /// this reflects where its shell actually is.
    ///
    /// # Errors
    /// Returns error if the terminal is unknown or the service query fails.
    pub async fn current_dir(&self, id: &str) -> Result<String, TerminalError> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| TerminalError::UnknownSession(id.to_string()))?;
        self.service
            .current_dir(&handle.key, id)
            .await
            .map_err(|source| TerminalError::WorkingDirectory {
                id: id.to_string(),
                source,
            })
    }

    /// Snapshot of all terminals.
    pub async fn list_terminals(&self) -> Vec<Terminal> {
        self.registry.list().await
    }

    /// Snapshot of the terminals started in `path`.
    pub async fn terminals_for_path(&self, path: &str) -> Vec<Terminal> {
        self.registry.for_path(path).await
    }

    /// Snapshot of one terminal.
    pub async fn terminal(&self, id: &str) -> Option<Terminal> {
        self.registry.snapshot(id).await
    }

    /// Transcript of one terminal.
    pub async fn transcript(&self, id: &str) -> Option<Vec<TranscriptLine>> {
        self.registry.snapshot(id).await.map(|t| t.history)
    }

    /// Subscribe to terminal changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.feed.subscribe()
    }

    /// The change feed.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    async fn current_scope(&self) -> (String, u64) {
        let scope = self.scope.read().await;
        (scope.context.key.clone(), scope.generation)
    }

    async fn reset(&self, scope: &mut Scope) {
        scope.generation += 1;
        let dropped = self.registry.clear().await;
        if dropped > 0 {
            tracing::info!(count = dropped, key = %scope.context.key, "Cleared terminals");
        }
        self.feed.push(TerminalEvent::Cleared);
    }

    /// Register `terminal` and announce it, unless the project was cleared
    /// after `generation` was read. `None` means the ID is already taken.
    async fn install(
        &self,
        generation: u64,
        key: &str,
        terminal: Terminal,
        event: TerminalEvent,
    ) -> Result<Option<SessionHandle>, TerminalError> {
        let scope = self.scope.read().await;
        if scope.generation != generation {
            return Err(TerminalError::ProjectChanged(key.to_string()));
        }
        let handle = self.registry.insert(key, terminal).await;
        if handle.is_some() {
            self.feed.push(event);
        }
        Ok(handle)
    }

    async fn discard_remote(&self, key: &str, id: &str) {
        tracing::info!(session_id = %id, %key, "Closing session of cleared project");
        if let Err(e) = self.service.close_session(key, id).await {
            tracing::warn!(session_id = %id, error = %e, "Failed to close orphaned session");
        }
    }

    fn poller(&self, handle: SessionHandle) -> Poller<S> {
        Poller::new(Arc::clone(&self.service), handle, self.feed.clone())
    }

    async fn append(&self, handle: &SessionHandle, lines: Vec<TranscriptLine>) {
        let mut terminal = handle.terminal.lock().await;
        if handle.is_closed() {
            tracing::debug!(session_id = %handle.id, "Dropping lines for closed terminal");
            return;
        }
        terminal.history.extend(lines.iter().cloned());
        self.feed.push_lines(&handle.id, lines);
    }
}

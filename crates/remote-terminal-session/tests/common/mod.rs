//! Scripted in-memory execution service for tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use remote_terminal_core::{
    CommandOutput, Dispatch, ExecService, RemoteSession, ServiceError, SessionId,
};
use tokio::sync::Notify;

#[derive(Default)]
struct FakeSession {
    name: String,
    path: String,
    content: String,
}

#[derive(Default)]
struct State {
    next_id: u32,
    sessions: BTreeMap<SessionId, FakeSession>,
    replies: HashMap<String, String>,
    completed: Option<CommandOutput>,
    executed: Vec<String>,
    content_calls: usize,
    fail_create: bool,
    fail_execute: bool,
    fail_content: bool,
    fail_close: bool,
    fail_list: bool,
    fail_pwd: bool,
    reuse_id: Option<SessionId>,
}

/// Shell-like fake: executing a command appends its echo followed by the
/// scripted reply to the session buffer.
#[derive(Default)]
pub struct FakeService {
    state: Mutex<State>,
    content_gate: Mutex<Option<Arc<Notify>>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn reply(&self, command: &str, output: &str) {
        self.with_state(|s| {
            s.replies.insert(command.to_string(), output.to_string());
        });
    }

    /// Run every command synchronously and return `output`.
    pub fn complete_with(&self, output: CommandOutput) {
        self.with_state(|s| s.completed = Some(output));
    }

    /// Add a session created elsewhere.
    pub fn preload(&self, id: &str, name: &str, path: &str, content: &str) {
        self.with_state(|s| {
            s.sessions.insert(
                id.to_string(),
                FakeSession {
                    name: name.to_string(),
                    path: path.to_string(),
                    content: content.to_string(),
                },
            );
        });
    }

    pub fn append(&self, id: &str, text: &str) {
        self.with_state(|s| {
            if let Some(session) = s.sessions.get_mut(id) {
                session.content.push_str(text);
            }
        });
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.with_state(|s| s.sessions.contains_key(id))
    }

    pub fn executed(&self) -> Vec<String> {
        self.with_state(|s| s.executed.clone())
    }

    pub fn content_calls(&self) -> usize {
        self.with_state(|s| s.content_calls)
    }

    pub fn fail_create(&self, fail: bool) {
        self.with_state(|s| s.fail_create = fail);
    }

    pub fn fail_execute(&self, fail: bool) {
        self.with_state(|s| s.fail_execute = fail);
    }

    pub fn fail_content(&self, fail: bool) {
        self.with_state(|s| s.fail_content = fail);
    }

    pub fn fail_close(&self, fail: bool) {
        self.with_state(|s| s.fail_close = fail);
    }

    pub fn fail_list(&self, fail: bool) {
        self.with_state(|s| s.fail_list = fail);
    }

    pub fn fail_pwd(&self, fail: bool) {
        self.with_state(|s| s.fail_pwd = fail);
    }

    /// Hand out `id` from every later `create_session`.
    pub fn reuse_id(&self, id: &str) {
        self.with_state(|s| s.reuse_id = Some(id.to_string()));
    }

    /// Make the next session creation wait until the returned notify fires.
    pub fn hold_create(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    /// Make the next content fetch wait until the returned notify fires.
    pub fn hold_content(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.content_gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }
}

fn unreachable_host() -> ServiceError {
    ServiceError::Transport("host unreachable".to_string())
}

#[async_trait]
impl ExecService for FakeService {
    async fn create_session(
        &self,
        _key: &str,
        name: &str,
        path: &str,
    ) -> Result<SessionId, ServiceError> {
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.with_state(|s| {
            if s.fail_create {
                return Err(unreachable_host());
            }
            if let Some(id) = s.reuse_id.clone() {
                return Ok(id);
            }
            s.next_id += 1;
            let id = format!("term-{}", s.next_id);
            s.sessions.insert(
                id.clone(),
                FakeSession {
                    name: name.to_string(),
                    path: path.to_string(),
                    content: String::new(),
                },
            );
            Ok(id)
        })
    }

    async fn execute_command(
        &self,
        _key: &str,
        id: &str,
        command: &str,
    ) -> Result<Dispatch, ServiceError> {
        self.with_state(|s| {
            s.executed.push(command.to_string());
            if s.fail_execute {
                return Err(unreachable_host());
            }
            if let Some(output) = s.completed.clone() {
                return Ok(Dispatch::Completed(output));
            }
            let reply = s.replies.get(command).cloned().unwrap_or_default();
            let session = s
                .sessions
                .get_mut(id)
                .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
            session.content.push_str(command);
            session.content.push('\n');
            session.content.push_str(&reply);
            Ok(Dispatch::Queued)
        })
    }

    async fn get_session_content(&self, _key: &str, id: &str) -> Result<String, ServiceError> {
        let gate = self.content_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.with_state(|s| {
            s.content_calls += 1;
            if s.fail_content {
                return Err(unreachable_host());
            }
            s.sessions
                .get(id)
                .map(|session| session.content.clone())
                .ok_or_else(|| ServiceError::NotFound(id.to_string()))
        })
    }

    async fn list_sessions(&self, _key: &str) -> Result<Vec<RemoteSession>, ServiceError> {
        self.with_state(|s| {
            if s.fail_list {
                return Err(unreachable_host());
            }
            Ok(s.sessions
                .iter()
                .map(|(id, session)| RemoteSession {
                    id: id.clone(),
                    name: session.name.clone(),
                    path: session.path.clone(),
                })
                .collect())
        })
    }

    async fn close_session(&self, _key: &str, id: &str) -> Result<(), ServiceError> {
        self.with_state(|s| {
            if s.fail_close {
                return Err(unreachable_host());
            }
            s.sessions
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound(id.to_string()))
        })
    }

    async fn current_dir(&self, _key: &str, id: &str) -> Result<String, ServiceError> {
        self.with_state(|s| {
            if s.fail_pwd {
                return Err(ServiceError::Transport(
                    "Command failed: pwd: cannot access parent directories".to_string(),
                ));
            }
            s.sessions
                .get(id)
                .map(|session| format!("{}/sub", session.path.trim_end_matches('/')))
                .ok_or_else(|| ServiceError::NotFound(id.to_string()))
        })
    }
}

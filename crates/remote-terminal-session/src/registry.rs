//! In-memory table of live terminals.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use remote_terminal_core::{SessionId, TranscriptLine, transcript::now_millis};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::reconstruct;

/// One terminal session and its reconstructed transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    /// Identifier assigned by the execution service.
    pub id: SessionId,
    /// Human label.
    pub name: String,
    /// Directory the terminal was started in. Not updated by a remote `cd`.
    pub path: String,
    /// Full raw text received so far.
    #[serde(skip)]
    pub raw_content: String,
    /// Byte offset up to which `raw_content` has been turned into `history`.
    pub processed_len: usize,
    /// Transcript in append order.
    pub history: Vec<TranscriptLine>,
    /// Creation timestamp (Unix epoch millis).
    pub created_at: i64,
}

impl Terminal {
    /// Create a terminal with an empty transcript.
    #[must_use]
    pub fn new(id: impl Into<SessionId>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            raw_content: String::new(),
            processed_len: 0,
            history: Vec::new(),
            created_at: now_millis(),
        }
    }

    /// Append a line to the transcript.
    pub fn push(&mut self, line: TranscriptLine) {
        self.history.push(line);
    }

    /// Commands at the tail of the transcript still waiting for their echo.
    #[must_use]
    pub fn pending_echoes(&self) -> HashSet<&str> {
        reconstruct::pending_echoes(&self.history)
    }
}

/// Shared handle to a registered terminal.
///
/// The token is cancelled when the terminal leaves the registry; every
/// task holding a handle must check it before mutating the terminal.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    /// Project key the terminal was registered under.
    pub key: String,
    pub terminal: Arc<Mutex<Terminal>>,
    pub cancel: CancellationToken,
}

impl SessionHandle {
    /// Whether the terminal has been removed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct Entry {
    seq: u64,
    handle: SessionHandle,
}

/// Registry of live terminals keyed by session ID.
///
/// Each entry carries the cancellation token of the terminal's poller,
/// so removal and cancellation are one step.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<SessionId, Entry>>,
    next_seq: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a terminal. Returns `None` if its ID is already present.
    pub async fn insert(&self, key: &str, terminal: Terminal) -> Option<SessionHandle> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&terminal.id) {
            return None;
        }

        let handle = SessionHandle {
            id: terminal.id.clone(),
            key: key.to_string(),
            terminal: Arc::new(Mutex::new(terminal)),
            cancel: CancellationToken::new(),
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            handle.id.clone(),
            Entry {
                seq,
                handle: handle.clone(),
            },
        );
        Some(handle)
    }

    /// Look up a terminal's handle.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.entries.read().await.get(id).map(|e| e.handle.clone())
    }

    /// Whether a terminal is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Copy of one terminal.
    pub async fn snapshot(&self, id: &str) -> Option<Terminal> {
        let handle = self.get(id).await?;
        let terminal = handle.terminal.lock().await;
        Some(terminal.clone())
    }

    /// Copies of all terminals, in registration order.
    pub async fn list(&self) -> Vec<Terminal> {
        let handles = self.handles().await;
        let mut terminals = Vec::with_capacity(handles.len());
        for handle in handles {
            terminals.push(handle.terminal.lock().await.clone());
        }
        terminals
    }

    /// Copies of the terminals started in `path`.
    pub async fn for_path(&self, path: &str) -> Vec<Terminal> {
        let mut terminals = self.list().await;
        terminals.retain(|t| t.path == path);
        terminals
    }

    /// Remove a terminal and cancel its poller. Unknown IDs are a no-op.
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        let entry = self.entries.write().await.remove(id)?;
        entry.handle.cancel.cancel();
        Some(entry.handle)
    }

    /// Remove every terminal, cancelling all pollers. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let drained: Vec<Entry> = self.entries.write().await.drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.handle.cancel.cancel();
        }
        drained.len()
    }

    /// Number of registered terminals.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no terminal is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn handles(&self) -> Vec<SessionHandle> {
        let entries = self.entries.read().await;
        let mut ordered: Vec<&Entry> = entries.values().collect();
        ordered.sort_by_key(|e| e.seq);
        ordered.into_iter().map(|e| e.handle.clone()).collect()
    }
}

//! Broadcast feed of terminal changes.

use futures::{StreamExt, future, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{SessionId, TranscriptLine};

/// Default channel capacity before slow subscribers start lagging.
const FEED_CAPACITY: usize = 1024;

/// A change to the set of terminals or to one terminal's transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TerminalEvent {
    /// A terminal was created by this process.
    Created { session_id: SessionId },
    /// A terminal that already existed on the service was taken over.
    Adopted { session_id: SessionId },
    /// Lines were appended to a transcript.
    Lines {
        session_id: SessionId,
        lines: Vec<TranscriptLine>,
    },
    /// A terminal was removed.
    Closed { session_id: SessionId },
    /// Every terminal was dropped with the project context.
    Cleared,
}

impl TerminalEvent {
    /// Session the event concerns, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Created { session_id }
            | Self::Adopted { session_id }
            | Self::Lines { session_id, .. }
            | Self::Closed { session_id } => Some(session_id),
            Self::Cleared => None,
        }
    }
}

/// Explicit change notification for terminal subscribers.
///
/// Live only: a subscriber sees events published after it subscribed.
/// The transcript itself is the history; read it from the manager.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<TerminalEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    /// Create a new feed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    /// Create a feed with a custom channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn push(&self, event: TerminalEvent) {
        let _ = self.sender.send(event);
    }

    /// Publish appended lines; empty batches are not published.
    pub fn push_lines(&self, session_id: &str, lines: Vec<TranscriptLine>) {
        if lines.is_empty() {
            return;
        }
        self.push(TerminalEvent::Lines {
            session_id: session_id.to_string(),
            lines,
        });
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of every event. Lagged receivers skip the missed events.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, TerminalEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| future::ready(res.ok()))
            .boxed()
    }

    /// Stream of lines appended to one session, ending when it closes.
    #[must_use]
    pub fn transcript_stream(&self, session_id: &str) -> BoxStream<'static, TranscriptLine> {
        let id = session_id.to_string();
        self.events()
            .filter(move |event| {
                future::ready(
                    matches!(event, TerminalEvent::Cleared) || event.session_id() == Some(id.as_str()),
                )
            })
            .take_while(|event| {
                future::ready(!matches!(
                    event,
                    TerminalEvent::Closed { .. } | TerminalEvent::Cleared
                ))
            })
            .flat_map(|event| match event {
                TerminalEvent::Lines { lines, .. } => futures::stream::iter(lines),
                _ => futures::stream::iter(Vec::new()),
            })
            .boxed()
    }
}

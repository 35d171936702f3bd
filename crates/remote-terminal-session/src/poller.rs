//! Per-terminal polling of the remote output buffer.

use std::{sync::Arc, time::Duration};

use remote_terminal_core::{ChangeFeed, ExecService};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{reconstruct, registry::SessionHandle};

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Content was applied; holds the number of lines appended.
    Applied(usize),
    /// The fetch failed; the next cycle retries.
    Failed,
    /// The terminal was closed; the result, if any, was discarded.
    Cancelled,
}

impl PollOutcome {
    /// Lines appended by this cycle.
    #[must_use]
    pub const fn appended(self) -> usize {
        match self {
            Self::Applied(n) => n,
            Self::Failed | Self::Cancelled => 0,
        }
    }
}

/// Fetches a terminal's content and feeds growth to the reconstructor.
pub struct Poller<S> {
    service: Arc<S>,
    handle: SessionHandle,
    feed: ChangeFeed,
}

impl<S> Clone for Poller<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            handle: self.handle.clone(),
            feed: self.feed.clone(),
        }
    }
}

impl<S> Poller<S>
where
    S: ExecService + 'static,
{
    /// Create a poller for a registered terminal.
    #[must_use]
    pub const fn new(service: Arc<S>, handle: SessionHandle, feed: ChangeFeed) -> Self {
        Self {
            service,
            handle,
            feed,
        }
    }

    /// Run one fetch-and-reconstruct cycle.
    ///
    /// A fetch that completes after the terminal was closed is dropped.
    pub async fn poll_once(&self) -> PollOutcome {
        let id = &self.handle.id;
        if self.handle.is_closed() {
            return PollOutcome::Cancelled;
        }

        let content = match self
            .service
            .get_session_content(&self.handle.key, id)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "Poll failed");
                return PollOutcome::Failed;
            }
        };

        let mut terminal = self.handle.terminal.lock().await;
        if self.handle.is_closed() {
            tracing::debug!(session_id = %id, "Discarding poll result for closed terminal");
            return PollOutcome::Cancelled;
        }

        let lines = reconstruct::ingest(&mut terminal, &content);
        let appended = lines.len();
        self.feed.push_lines(id, lines);
        PollOutcome::Applied(appended)
    }

    /// Poll every `interval` until the terminal is closed.
    ///
    /// The first cycle runs one interval after spawning.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = self.handle.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if self.poll_once().await == PollOutcome::Cancelled {
                    break;
                }
            }
            tracing::debug!(session_id = %self.handle.id, "Poller stopped");
        })
    }

    /// Run a single extra cycle after `delay`, outside the regular schedule.
    pub fn spawn_delayed(&self, delay: Duration) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = poller.handle.cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    poller.poll_once().await;
                }
            }
        })
    }
}

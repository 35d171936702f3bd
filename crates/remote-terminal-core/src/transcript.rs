//! Structured transcript lines.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Kind of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Input submitted by the caller.
    Command,
    /// Output produced by the remote shell.
    Output,
    /// A failure reported in-band.
    Error,
}

/// One line of a terminal transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    #[serde(rename = "type")]
    pub kind: LineKind,
    pub content: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl TranscriptLine {
    /// Create a line stamped with the current time.
    #[must_use]
    pub fn new(kind: LineKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    #[must_use]
    pub fn command(content: impl Into<String>) -> Self {
        Self::new(LineKind::Command, content)
    }

    #[must_use]
    pub fn output(content: impl Into<String>) -> Self {
        Self::new(LineKind::Output, content)
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(LineKind::Error, content)
    }

    #[must_use]
    pub fn is_command(&self) -> bool {
        self.kind == LineKind::Command
    }
}

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

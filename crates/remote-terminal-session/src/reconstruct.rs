//! Turns raw terminal output into transcript lines.
//!
//! The remote shell echoes each submitted command before its output.
//! There is no correlation between a submitted command and the echoed
//! line, so suppression works on a local window: the run of command
//! lines at the tail of the transcript.

use std::collections::HashSet;

use remote_terminal_core::{CommandOutput, TranscriptLine};

use crate::registry::Terminal;

/// Trimmed text of the unbroken run of command lines ending the transcript.
#[must_use]
pub fn pending_echoes(history: &[TranscriptLine]) -> HashSet<&str> {
    history
        .iter()
        .rev()
        .take_while(|line| line.is_command())
        .map(|line| line.content.trim())
        .collect()
}

/// Non-empty trimmed lines of `text`.
pub fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Lines of `new_content` that are real output.
///
/// Each pending command suppresses at most one matching line per call;
/// a second identical line is kept.
#[must_use]
pub fn extract_output(new_content: &str, history: &[TranscriptLine]) -> Vec<String> {
    let mut echoes = pending_echoes(history);
    content_lines(new_content)
        .filter(|line| !echoes.remove(line))
        .map(str::to_owned)
        .collect()
}

/// Apply the full content buffer fetched for `terminal`.
///
/// Only the part past `processed_len` is parsed. Content that did not
/// grow is ignored. Returns the lines appended to the transcript.
pub fn ingest(terminal: &mut Terminal, content: &str) -> Vec<TranscriptLine> {
    if content.len() <= terminal.processed_len {
        if content.len() < terminal.processed_len {
            tracing::warn!(
                session_id = %terminal.id,
                received = content.len(),
                processed = terminal.processed_len,
                "Session content shrank, ignoring"
            );
        }
        return Vec::new();
    }

    let lines: Vec<TranscriptLine> = match content.get(terminal.processed_len..) {
        Some(new_content) => extract_output(new_content, &terminal.history)
            .into_iter()
            .map(TranscriptLine::output)
            .collect(),
        None => {
            tracing::warn!(
                session_id = %terminal.id,
                offset = terminal.processed_len,
                "Session content no longer matches processed prefix, skipping"
            );
            Vec::new()
        }
    };

    terminal.history.extend(lines.iter().cloned());
    content.clone_into(&mut terminal.raw_content);
    terminal.processed_len = content.len();
    lines
}

/// Transcript lines for a command the service ran to completion.
///
/// Stdout becomes output, stderr becomes errors, and a failing exit
/// without stderr is reported with its status.
#[must_use]
pub fn completed_lines(output: &CommandOutput) -> Vec<TranscriptLine> {
    let mut lines: Vec<TranscriptLine> = content_lines(&output.stdout)
        .map(TranscriptLine::output)
        .chain(content_lines(&output.stderr).map(TranscriptLine::error))
        .collect();

    if !output.success() && output.stderr.trim().is_empty() {
        lines.push(TranscriptLine::error(format!(
            "Command exited with status {}",
            output.exit_code
        )));
    }
    lines
}

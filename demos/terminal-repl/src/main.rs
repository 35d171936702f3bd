//! Line-based terminal manager demo over local shell sessions.
//!
//! Run with: cargo run -p terminal-repl
//!
//! Type `:help` for the list of commands. Anything else is run in the
//! current terminal.

use std::sync::Arc;

use anyhow::{Context, bail};
use remote_terminal_core::{LineKind, ProjectContext, TerminalEvent, TranscriptLine};
use remote_terminal_local::{DispatchMode, LocalConfig, LocalExecService};
use remote_terminal_session::{ManagerConfig, SessionManager};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Manager = SessionManager<LocalExecService>;

const HELP: &str = "\
:new <name> [path]   create a terminal (default path: current directory)
:use <id>            switch to a terminal (prefix is enough)
:list                list terminals
:show                print the current transcript
:pwd                 ask the shell for its working directory
:load                adopt terminals held by the service
:close [id]          close a terminal (default: current)
:quit                exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ManagerConfig::from_env().context("reading manager configuration")?;
    let local = LocalConfig {
        shell: std::env::var("TERMINAL_SHELL").ok(),
        mode: match std::env::var("TERMINAL_DISPATCH").as_deref() {
            Ok("immediate") => DispatchMode::Immediate,
            _ => DispatchMode::Buffered,
        },
        ..LocalConfig::default()
    };
    let key = std::env::var("TERMINAL_PROJECT").unwrap_or_else(|_| "local".to_string());

    let manager = Arc::new(SessionManager::with_config(
        LocalExecService::new(local),
        ProjectContext::new(key),
        config,
    ));
    let printer = tokio::spawn(print_events(manager.subscribe()));

    let mut current: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" {
            break;
        }
        if let Err(e) = handle(&manager, &mut current, line).await {
            eprintln!("error: {e:#}");
        }
    }

    manager.clear().await;
    printer.abort();
    Ok(())
}

async fn handle(manager: &Manager, current: &mut Option<String>, line: &str) -> anyhow::Result<()> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some(":help") => println!("{HELP}"),
        Some(":new") => {
            let name = words.next().context("usage: :new <name> [path]")?;
            let path = match words.next() {
                Some(path) => path.to_string(),
                None => std::env::current_dir()?.to_string_lossy().into_owned(),
            };
            let terminal = manager.create_terminal(name, &path).await?;
            print_lines(&terminal.id, &terminal.history);
            *current = Some(terminal.id);
        }
        Some(":use") => {
            let prefix = words.next().context("usage: :use <id>")?;
            *current = Some(resolve(manager, prefix).await?);
        }
        Some(":list") => {
            for terminal in manager.list_terminals().await {
                let marker = if current.as_deref() == Some(terminal.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{marker} {}  {}  {}", terminal.id, terminal.name, terminal.path);
            }
        }
        Some(":show") => {
            let id = current.as_deref().context("no terminal selected")?;
            let history = manager.transcript(id).await.context("terminal is gone")?;
            print_lines(id, &history);
        }
        Some(":pwd") => {
            let id = current.as_deref().context("no terminal selected")?;
            println!("{}", manager.current_dir(id).await?);
        }
        Some(":load") => {
            let adopted = manager.load_terminals().await?;
            println!("adopted {} terminal(s)", adopted.len());
        }
        Some(":close") => {
            let id = match words.next() {
                Some(prefix) => resolve(manager, prefix).await?,
                None => current.clone().context("no terminal selected")?,
            };
            if current.as_deref() == Some(id.as_str()) {
                *current = None;
            }
            manager.close_terminal(&id).await?;
        }
        Some(other) if other.starts_with(':') => bail!("unknown command {other}, try :help"),
        _ => {
            let id = current.as_deref().context("no terminal selected, use :new")?;
            manager.execute_command(id, line).await?;
        }
    }
    Ok(())
}

async fn resolve(manager: &Manager, prefix: &str) -> anyhow::Result<String> {
    let matches: Vec<String> = manager
        .list_terminals()
        .await
        .into_iter()
        .map(|t| t.id)
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("no terminal matches {prefix}"),
        _ => bail!("{prefix} is ambiguous"),
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<TerminalEvent>) {
    loop {
        match events.recv().await {
            Ok(TerminalEvent::Lines { session_id, lines }) => {
                // Commands were typed locally; only show what came back.
                let echoed: Vec<TranscriptLine> =
                    lines.into_iter().filter(|l| !l.is_command()).collect();
                print_lines(&session_id, &echoed);
            }
            Ok(TerminalEvent::Closed { session_id }) => println!("[{}] closed", short(&session_id)),
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event printer lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_lines(id: &str, lines: &[TranscriptLine]) {
    for line in lines {
        let prefix = match line.kind {
            LineKind::Command => "$",
            LineKind::Output => " ",
            LineKind::Error => "!",
        };
        println!("[{}] {prefix} {}", short(id), line.content);
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

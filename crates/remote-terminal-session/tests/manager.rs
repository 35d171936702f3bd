mod common;

use std::{sync::Arc, time::Duration};

use common::FakeService;
use remote_terminal_core::{CommandOutput, LineKind, ProjectContext, TerminalEvent};
use remote_terminal_session::{ManagerConfig, SessionManager, TerminalError};
use tokio_test::{assert_err, assert_ok};

fn manager(fake: &Arc<FakeService>) -> SessionManager<Arc<FakeService>> {
    let config = ManagerConfig {
        poll_interval_ms: 1_000,
        echo_poll_delay_ms: 100,
    };
    SessionManager::with_config(Arc::clone(fake), ProjectContext::new("proj"), config)
}

async fn contents(manager: &SessionManager<Arc<FakeService>>, id: &str) -> Vec<String> {
    manager
        .transcript(id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.content)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_create_terminal_registers_with_banner() {
    let fake = FakeService::new();
    let manager = manager(&fake);

    let terminal = assert_ok!(manager.create_terminal("main", "/srv/app").await);

    assert_eq!(terminal.id, "term-1");
    assert_eq!(terminal.path, "/srv/app");
    assert_eq!(
        contents(&manager, &terminal.id).await,
        vec!["Terminal \"main\" started at /srv/app"]
    );
    assert_eq!(manager.list_terminals().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_leaves_registry_unchanged() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    manager.create_terminal("main", "/").await.unwrap();

    fake.fail_create(true);
    let err = assert_err!(manager.create_terminal("second", "/tmp").await);

    assert!(matches!(err, TerminalError::Creation(_)));
    assert_eq!(manager.list_terminals().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_execute_on_unknown_terminal() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let terminal = manager.create_terminal("main", "/").await.unwrap();

    let err = assert_err!(manager.execute_command("nope", "ls").await);

    assert!(matches!(err, TerminalError::UnknownSession(ref id) if id == "nope"));
    assert_eq!(manager.transcript(&terminal.id).await.unwrap().len(), 1);
    assert!(fake.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_command_output_arrives_without_echo() {
    let fake = FakeService::new();
    fake.reply("ls -la", "file1\nfile2\n");
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/").await.unwrap().id;

    assert_ok!(manager.execute_command(&id, "ls -la").await);
    let history = manager.transcript(&id).await.unwrap();
    assert_eq!(history.last().unwrap().kind, LineKind::Command);

    // The post-command poll lands well before the regular one.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let history = manager.transcript(&id).await.unwrap();
    let tail: Vec<(LineKind, &str)> = history[1..]
        .iter()
        .map(|l| (l.kind, l.content.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            (LineKind::Command, "ls -la"),
            (LineKind::Output, "file1"),
            (LineKind::Output, "file2"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_execution_failure_is_recorded_in_transcript() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/").await.unwrap().id;

    fake.fail_execute(true);
    assert_ok!(manager.execute_command(&id, "reboot").await);

    let history = manager.transcript(&id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.kind, LineKind::Error);
    assert_eq!(last.content, "Error: Transport error: host unreachable");
    assert_eq!(history[history.len() - 2].content, "reboot");
}

#[tokio::test(start_paused = true)]
async fn test_completed_execution_is_recorded_directly() {
    let fake = FakeService::new();
    fake.complete_with(CommandOutput {
        stdout: "total 0\n".to_string(),
        stderr: String::new(),
        exit_code: 2,
    });
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/").await.unwrap().id;

    manager.execute_command(&id, "ls missing").await.unwrap();

    let history = manager.transcript(&id).await.unwrap();
    let tail: Vec<(LineKind, &str)> = history[1..]
        .iter()
        .map(|l| (l.kind, l.content.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            (LineKind::Command, "ls missing"),
            (LineKind::Output, "total 0"),
            (LineKind::Error, "Command exited with status 2"),
        ]
    );
    assert_eq!(fake.content_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_removes_terminal() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let keep = manager.create_terminal("keep", "/").await.unwrap().id;
    let gone = manager.create_terminal("gone", "/").await.unwrap().id;

    assert_ok!(manager.close_terminal(&gone).await);

    let ids: Vec<String> = manager.list_terminals().await.into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![keep]);
    assert!(!fake.has_session(&gone));
    assert!(manager.terminal(&gone).await.is_none());

    // Unknown IDs are ignored.
    assert_ok!(manager.close_terminal(&gone).await);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failure_still_removes_locally() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/").await.unwrap().id;

    fake.fail_close(true);
    let err = assert_err!(manager.close_terminal(&id).await);

    assert!(matches!(err, TerminalError::Teardown { .. }));
    assert!(manager.list_terminals().await.is_empty());
    assert!(fake.has_session(&id));
}

#[tokio::test(start_paused = true)]
async fn test_poll_completing_after_close_is_discarded() {
    let fake = FakeService::new();
    let manager = Arc::new(manager(&fake));
    let id = manager.create_terminal("main", "/").await.unwrap().id;
    fake.append(&id, "late output\n");
    let mut events = manager.subscribe();

    let gate = fake.hold_content();
    let refresh = {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tokio::spawn(async move { manager.refresh(&id).await })
    };
    tokio::task::yield_now().await;

    // Keep the remote session so the held fetch still returns content.
    fake.fail_close(true);
    assert_err!(manager.close_terminal(&id).await);
    gate.notify_one();

    let appended = assert_ok!(refresh.await.unwrap());
    assert_eq!(appended, 0);
    assert_eq!(fake.content_calls(), 1);
    assert!(manager.terminal(&id).await.is_none());
    assert_eq!(
        events.recv().await.unwrap(),
        TerminalEvent::Closed { session_id: id }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_load_adopts_only_unknown_sessions() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let local = manager.create_terminal("main", "/").await.unwrap().id;
    fake.preload("remote-7", "build", "/srv", "uptime\n up 3 days\n\n");

    let adopted = assert_ok!(manager.load_terminals().await);
    assert_eq!(adopted, vec!["remote-7".to_string()]);

    let again = assert_ok!(manager.load_terminals().await);
    assert!(again.is_empty());

    let ids: Vec<String> = manager.list_terminals().await.into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![local, "remote-7".to_string()]);
    assert_eq!(
        contents(&manager, "remote-7").await,
        vec!["Terminal \"build\" reconnected", "uptime", "up 3 days"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_is_surfaced() {
    let fake = FakeService::new();
    fake.preload("remote-1", "db", "/", "");
    fake.fail_list(true);
    let manager = manager(&fake);

    let err = assert_err!(manager.load_terminals().await);

    assert!(matches!(err, TerminalError::Listing(_)));
    assert!(manager.list_terminals().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_project_switch_clears_terminals() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    manager.create_terminal("main", "/").await.unwrap();

    manager.set_project_key("proj").await;
    assert_eq!(manager.list_terminals().await.len(), 1);

    manager.set_project_key("other").await;
    assert!(manager.list_terminals().await.is_empty());
    assert_eq!(manager.project_key().await, "other");
}

#[tokio::test(start_paused = true)]
async fn test_terminals_for_path() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    manager.create_terminal("a", "/srv").await.unwrap();
    manager.create_terminal("b", "/var/log").await.unwrap();
    manager.create_terminal("c", "/srv").await.unwrap();

    let names: Vec<String> = manager
        .terminals_for_path("/srv")
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_lifecycle() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let mut events = manager.subscribe();

    let id = manager.create_terminal("main", "/").await.unwrap().id;
    manager.execute_command(&id, "pwd").await.unwrap();
    manager.close_terminal(&id).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        TerminalEvent::Created {
            session_id: id.clone()
        }
    );
    match events.recv().await.unwrap() {
        TerminalEvent::Lines { session_id, lines } => {
            assert_eq!(session_id, id);
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].kind, LineKind::Command);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        events.recv().await.unwrap(),
        TerminalEvent::Closed { session_id: id }
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_pending_across_project_switch_is_dropped() {
    let fake = FakeService::new();
    let manager = Arc::new(manager(&fake));

    let gate = fake.hold_create();
    let create = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.create_terminal("main", "/srv").await })
    };
    tokio::task::yield_now().await;

    manager.set_project_key("other").await;
    gate.notify_one();

    let err = assert_err!(create.await.unwrap());
    assert!(matches!(err, TerminalError::ProjectChanged(ref key) if key == "proj"));
    assert!(manager.list_terminals().await.is_empty());
    assert!(!fake.has_session("term-1"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fake.content_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_pending_across_clear_is_dropped() {
    let fake = FakeService::new();
    let manager = Arc::new(manager(&fake));

    let gate = fake.hold_create();
    let create = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.create_terminal("main", "/srv").await })
    };
    tokio::task::yield_now().await;

    manager.clear().await;
    gate.notify_one();

    let err = assert_err!(create.await.unwrap());
    assert!(matches!(err, TerminalError::ProjectChanged(_)));
    assert!(manager.list_terminals().await.is_empty());

    // The project itself is unchanged, so later creations go through.
    assert_ok!(manager.create_terminal("main", "/srv").await);
}

#[tokio::test(start_paused = true)]
async fn test_load_interrupted_by_clear_adopts_nothing() {
    let fake = FakeService::new();
    let manager = Arc::new(manager(&fake));
    fake.preload("remote-1", "build", "/srv", "make\n");
    fake.preload("remote-2", "logs", "/var/log", "tail\n");

    // Hold the backfill of the first adopted session.
    let gate = fake.hold_content();
    let load = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.load_terminals().await })
    };
    tokio::task::yield_now().await;

    manager.clear().await;
    gate.notify_one();

    let err = assert_err!(load.await.unwrap());
    assert!(matches!(err, TerminalError::ProjectChanged(_)));
    assert!(manager.list_terminals().await.is_empty());
    assert!(fake.has_session("remote-1"));
    assert!(fake.has_session("remote-2"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_id_keeps_registered_terminal() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/").await.unwrap().id;

    fake.reuse_id(&id);
    let err = assert_err!(manager.create_terminal("again", "/tmp").await);

    assert!(matches!(err, TerminalError::DuplicateSession(ref dup) if *dup == id));
    assert!(fake.has_session(&id));
    assert_eq!(manager.terminal(&id).await.unwrap().name, "main");
    assert_eq!(manager.list_terminals().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_current_dir_queries_service() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/srv/app").await.unwrap().id;

    let cwd = assert_ok!(manager.current_dir(&id).await);

    assert_eq!(cwd, "/srv/app/sub");
    assert_eq!(manager.terminal(&id).await.unwrap().path, "/srv/app");
}

#[tokio::test(start_paused = true)]
async fn test_current_dir_failures() {
    let fake = FakeService::new();
    let manager = manager(&fake);
    let id = manager.create_terminal("main", "/srv/app").await.unwrap().id;

    let err = assert_err!(manager.current_dir("nope").await);
    assert!(matches!(err, TerminalError::UnknownSession(_)));

    fake.fail_pwd(true);
    let err = assert_err!(manager.current_dir(&id).await);
    assert!(matches!(err, TerminalError::WorkingDirectory { id: ref failed, .. } if *failed == id));
    assert!(err.to_string().contains("Command failed"));
}

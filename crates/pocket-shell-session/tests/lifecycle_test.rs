//! End-to-end tests running real commands through the session manager.

use std::path::Path;
use std::time::{Duration, Instant};

use pocket_shell_core::{EngineConfig, Error, SessionId, SessionState, TransportKind};
use pocket_shell_session::{SessionManager, SubmitOutcome, DONE_MARKER, STOPPED_MARKER};
use tokio::runtime::Handle;

fn config(home: &Path, transport: TransportKind) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.session.home_dir = Some(home.to_path_buf());
    config.session.transport = transport;
    config.reader.poll_interval_ms = 10;
    config
}

fn manager(home: &Path, transport: TransportKind) -> SessionManager {
    SessionManager::with_config(config(home, transport), Handle::current()).unwrap()
}

/// Poll until the session reaches Done, panicking after a deadline.
async fn wait_for_done(manager: &SessionManager, id: &SessionId) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if manager.status(id).unwrap().state == SessionState::Done {
            return;
        }
        assert!(Instant::now() < deadline, "session never reached Done");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_echo_hello_pty() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::PseudoTerminal);
    let id = manager.create_session().unwrap();

    assert_eq!(
        manager.submit(&id, "echo hello").unwrap(),
        SubmitOutcome::Started
    );
    wait_for_done(&manager, &id).await;

    assert_eq!(
        manager.lines(&id).unwrap(),
        vec!["pi$ echo hello", "hello", DONE_MARKER]
    );
    let status = manager.status(&id).unwrap();
    assert_eq!(status.exit_code, Some(0));
    assert!(!status.is_running);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_echo_hello_pipe() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "echo hello").unwrap();
    wait_for_done(&manager, &id).await;

    assert_eq!(
        manager.lines(&id).unwrap(),
        vec!["pi$ echo hello", "hello", DONE_MARKER]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stderr_is_captured() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "echo oops 1>&2").unwrap();
    wait_for_done(&manager, &id).await;

    assert!(manager.lines(&id).unwrap().contains(&"oops".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nonzero_exit_code() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "(exit 3)").unwrap();
    wait_for_done(&manager, &id).await;

    assert_eq!(manager.lines(&id).unwrap(), vec!["pi$ (exit 3)", "Exit:3"]);
    assert_eq!(manager.status(&id).unwrap().exit_code, Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_long_output_is_wrapped() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::PseudoTerminal);
    let id = manager.create_session().unwrap();

    manager
        .submit(&id, "echo abcdefghijklmnopqrstuvwxyz0123456789")
        .unwrap();
    wait_for_done(&manager, &id).await;

    let lines = manager.lines(&id).unwrap();
    assert_eq!(lines[0], "pi$ echo abcdefghijkl");
    assert_eq!(
        &lines[1..],
        &["abcdefghijklmnopqrstu", "vwxyz0123456789", DONE_MARKER]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unterminated_output_is_flushed() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "printf 'no newline'").unwrap();
    wait_for_done(&manager, &id).await;

    assert_eq!(
        manager.lines(&id).unwrap(),
        vec!["pi$ printf 'no newlin", "no newline", DONE_MARKER]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_control_sequences_stripped() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager
        .submit(&id, r"printf '\033[1;31mred\033[0m\n'")
        .unwrap();
    wait_for_done(&manager, &id).await;

    assert_eq!(manager.lines(&id).unwrap()[1], "red");
}

async fn cancel_sleep(transport: TransportKind) {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), transport);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "sleep 10").unwrap();
    assert_eq!(manager.status(&id).unwrap().state, SessionState::Running);

    let started = Instant::now();
    manager.cancel(&id).unwrap();
    wait_for_done(&manager, &id).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let lines = manager.lines(&id).unwrap();
    let stopped = lines
        .iter()
        .position(|line| line == STOPPED_MARKER)
        .expect("stopped marker");
    assert!(!lines.contains(&DONE_MARKER.to_string()));
    if let Some(exit) = lines.iter().position(|line| line.starts_with("Exit:")) {
        assert!(stopped < exit);
    }
    assert_ne!(manager.status(&id).unwrap().exit_code, Some(0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_sleep_pty() {
    cancel_sleep(TransportKind::PseudoTerminal).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_sleep_pipe() {
    cancel_sleep(TransportKind::Pipe).await;
}

/// Whether `pid` is gone or only left as a zombie awaiting its new parent.
fn process_is_dead(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks for existence.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH);
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_kills_whole_group() {
    for transport in [TransportKind::Pipe, TransportKind::PseudoTerminal] {
        let home = tempfile::tempdir().unwrap();
        let manager = manager(home.path(), transport);
        let id = manager.create_session().unwrap();

        manager.submit(&id, "sleep 30 & echo $!; wait").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let background = loop {
            let pid = manager
                .lines(&id)
                .unwrap()
                .iter()
                .skip(1)
                .find_map(|line| line.parse::<libc::pid_t>().ok());
            if let Some(pid) = pid {
                break pid;
            }
            assert!(Instant::now() < deadline, "background pid never printed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(!process_is_dead(background));

        manager.cancel(&id).unwrap();
        wait_for_done(&manager, &id).await;

        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_is_dead(background) {
            assert!(
                Instant::now() < deadline,
                "{transport:?}: background job {background} survived cancel"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(manager.lines(&id).unwrap().contains(&STOPPED_MARKER.to_string()));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_cancel_while_stopping() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "sleep 10").unwrap();
    manager.cancel(&id).unwrap();
    // Either still Stopping (Ok) or already Done (NotRunning).
    match manager.cancel(&id) {
        Ok(()) | Err(Error::NotRunning(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
    }
    wait_for_done(&manager, &id).await;

    let stops = manager
        .lines(&id)
        .unwrap()
        .iter()
        .filter(|line| *line == STOPPED_MARKER)
        .count();
    assert_eq!(stops, 1);
    assert!(matches!(
        manager.cancel(&id).unwrap_err(),
        Error::NotRunning(_)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_submit_while_running_is_busy() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "sleep 10").unwrap();
    let result = manager.submit(&id, "echo second");
    assert!(matches!(result.unwrap_err(), Error::SessionBusy(_)));

    // Rejected text is echoed and kept in history, but nothing runs.
    let lines = manager.lines(&id).unwrap();
    assert_eq!(lines, vec!["pi$ sleep 10", "pi$ echo second"]);
    assert_eq!(manager.history_back(&id).unwrap(), "echo second");
    assert_eq!(manager.history_back(&id).unwrap(), "sleep 10");
    assert_eq!(manager.get_session(&id).unwrap().command().as_deref(), Some("sleep 10"));

    manager.cancel(&id).unwrap();
    wait_for_done(&manager, &id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_builtins_allowed_while_running() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "sleep 10").unwrap();
    assert_eq!(manager.submit(&id, "clear").unwrap(), SubmitOutcome::Builtin);
    assert!(manager.lines(&id).unwrap().is_empty());
    assert_eq!(manager.status(&id).unwrap().state, SessionState::Running);

    manager.cancel(&id).unwrap();
    wait_for_done(&manager, &id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_done_resets_on_next_submission() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "true").unwrap();
    wait_for_done(&manager, &id).await;

    manager.submit(&id, "pwd").unwrap();
    let status = manager.status(&id).unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.exit_code, None);
    // Lines survive the reset.
    assert_eq!(manager.lines(&id).unwrap()[0], "pi$ true");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cd_then_command_runs_there() {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir(home.path().join("work")).unwrap();
    std::fs::write(home.path().join("work").join("marker.txt"), b"").unwrap();

    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    assert_eq!(manager.submit(&id, "cd work").unwrap(), SubmitOutcome::Builtin);
    let expected = home.path().join("work").canonicalize().unwrap();
    assert_eq!(manager.working_directory(&id).unwrap(), expected);

    manager.submit(&id, "ls").unwrap();
    wait_for_done(&manager, &id).await;
    assert!(manager.lines(&id).unwrap().contains(&"marker.txt".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cd_nonexistent_leaves_directory() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "cd /nonexistent").unwrap();

    assert_eq!(manager.lines(&id).unwrap().len(), 1);
    assert_eq!(manager.working_directory(&id).unwrap(), home.path());
    assert_eq!(manager.history_back(&id).unwrap(), "cd /nonexistent");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cd_home() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "cd /").unwrap();
    assert_eq!(manager.working_directory(&id).unwrap(), Path::new("/"));
    assert_eq!(manager.lines(&id).unwrap(), vec!["-> /"]);

    manager.submit(&id, "cd").unwrap();
    assert_eq!(
        manager.working_directory(&id).unwrap(),
        home.path().canonicalize().unwrap()
    );
    assert_eq!(manager.lines(&id).unwrap()[1], "-> ~");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_failure_keeps_session_idle() {
    let home = tempfile::tempdir().unwrap();
    let mut config = config(home.path(), TransportKind::Pipe);
    config.session.shell = "/nonexistent/shell".to_string();
    let manager = SessionManager::with_config(config, Handle::current()).unwrap();
    let id = manager.create_session().unwrap();

    assert_eq!(
        manager.submit(&id, "echo hi").unwrap(),
        SubmitOutcome::SpawnFailed
    );

    let lines = manager.lines(&id).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "pi$ echo hi");
    assert!(lines[1].starts_with("Err:"));
    assert!(lines[1].chars().count() <= 21);
    assert_eq!(manager.status(&id).unwrap().state, SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_session_kills_running_command() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "sleep 30").unwrap();
    let session = manager.get_session(&id).unwrap();

    let started = Instant::now();
    manager.close_session(&id).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(manager.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sessions_are_independent() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let first = manager.create_session().unwrap();
    let second = manager.create_session().unwrap();

    manager.submit(&first, "sleep 10").unwrap();
    manager.submit(&second, "echo other").unwrap();
    wait_for_done(&manager, &second).await;

    assert_eq!(manager.status(&first).unwrap().state, SessionState::Running);
    assert_eq!(
        manager.lines(&second).unwrap(),
        vec!["pi$ echo other", "other", DONE_MARKER]
    );

    manager.shutdown();
    assert_eq!(manager.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scroll_through_output() {
    let home = tempfile::tempdir().unwrap();
    let manager = manager(home.path(), TransportKind::Pipe);
    let id = manager.create_session().unwrap();

    manager.submit(&id, "seq 1 10").unwrap();
    wait_for_done(&manager, &id).await;

    // echo + 10 numbers + Done! = 12 lines, 6 visible
    assert_eq!(
        manager.visible_lines(&id, 6).unwrap(),
        vec!["6", "7", "8", "9", "10", DONE_MARKER]
    );
    for _ in 0..20 {
        manager.scroll_up(&id).unwrap();
    }
    assert_eq!(
        manager.visible_lines(&id, 6).unwrap(),
        vec!["pi$ seq 1 10", "1", "2", "3", "4", "5"]
    );
    manager.scroll_down(&id).unwrap();
    assert_eq!(manager.visible_lines(&id, 6).unwrap()[0], "1");

    // A new submission jumps back to the tail.
    manager.submit(&id, "pwd").unwrap();
    let visible = manager.visible_lines(&id, 6).unwrap();
    assert_eq!(visible[0], "7");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removed_working_directory_fails_spawn() {
    for transport in [TransportKind::PseudoTerminal, TransportKind::Pipe] {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join("x")).unwrap();
        let manager = manager(home.path(), transport);
        let id = manager.create_session().unwrap();

        manager.submit(&id, "cd x").unwrap();
        std::fs::remove_dir(home.path().join("x")).unwrap();

        assert_eq!(
            manager.submit(&id, "ls").unwrap(),
            SubmitOutcome::SpawnFailed,
            "{transport:?}"
        );
        let lines = manager.lines(&id).unwrap();
        assert_eq!(lines[lines.len() - 2], "pi$ ls");
        assert!(lines[lines.len() - 1].starts_with("Err:"));
        assert_eq!(manager.status(&id).unwrap().state, SessionState::Idle);
    }
}

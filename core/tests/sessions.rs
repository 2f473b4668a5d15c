// End-to-end tests against a fake interactive debugger: a bash script that
// speaks the same prompt protocol as GDB (a `(gdb) ` ready prompt and a
// `--Type <return> to continue--` pager prompt) without needing GDB installed.
#![cfg(unix)]

use std::str::FromStr;
use std::time::Duration;

use sungdb_core::CommandOutput;
use sungdb_core::DebuggerProfile;
use sungdb_core::PromptMarkers;
use sungdb_core::SessionError;
use sungdb_core::SessionId;
use sungdb_core::SessionManager;
use sungdb_core::StartParams;
use sungdb_core::StartedSession;

const FAKE_DEBUGGER_SCRIPT: &str = r#"
n=0
printf '(gdb) '
while IFS= read -r line; do
  case "$line" in
    quit)
      exit 0
      ;;
    pages)
      printf 'page-one\n--Type <return> to continue, or q <return> to quit--'
      IFS= read -r _ack
      printf 'page-two\n--Type <return> to continue, or q <return> to quit--'
      IFS= read -r _ack
      printf 'page-three\n(gdb) '
      ;;
    hang)
      printf 'partial output without a prompt\n'
      ;;
    slow)
      sleep 2
      n=$((n+1))
      printf '%s:slow\n(gdb) ' "$n"
      ;;
    die)
      exit 1
      ;;
    *)
      n=$((n+1))
      printf '%s:%s\n(gdb) ' "$n" "$line"
      ;;
  esac
done
"#;

fn fake_profile() -> DebuggerProfile {
    DebuggerProfile {
        executable: "/bin/bash".to_string(),
        args: vec!["-c".to_string(), FAKE_DEBUGGER_SCRIPT.to_string()],
        markers: PromptMarkers::gdb(),
        quit_command: "quit".to_string(),
        read_timeout: Duration::from_millis(1_000),
        submission_timeout: Duration::from_secs(30),
    }
}

fn unknown_session_id() -> SessionId {
    match SessionId::from_str("00000000-0000-0000-0000-000000000000") {
        Ok(session_id) => session_id,
        Err(err) => panic!("failed to build session id: {err}"),
    }
}

async fn start_session(manager: &SessionManager) -> StartedSession {
    match manager.start(StartParams::default()).await {
        Ok(started) => started,
        Err(err) => panic!("start failed: {err}"),
    }
}

async fn run(manager: &SessionManager, session_id: SessionId, command: &str) -> CommandOutput {
    match manager.execute(session_id, command).await {
        Ok(output) => output,
        Err(err) => panic!("execute {command:?} failed: {err}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_execute_terminate_round_trip() {
    let manager = SessionManager::new(fake_profile());

    let started = manager
        .start(StartParams {
            executable: None,
            working_dir: Some(std::env::temp_dir()),
        })
        .await;
    let started = match started {
        Ok(started) => started,
        Err(err) => panic!("start failed: {err}"),
    };
    assert!(started.pid.is_some());
    assert_eq!(started.working_dir, std::env::temp_dir());

    let result = run(&manager, started.session_id, "show version").await;
    assert_eq!(result.session_id, started.session_id);
    assert_eq!(result.command, "show version");
    assert!(result.output.contains("1:show version"));
    assert!(!result.output.contains("(gdb)"));

    match manager.terminate(started.session_id).await {
        Ok(terminated) => assert_eq!(terminated.session_id, started.session_id),
        Err(err) => panic!("terminate failed: {err}"),
    }

    let remaining = manager.list().await;
    assert!(
        remaining
            .iter()
            .all(|summary| summary.session_id != started.session_id)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_execute_in_submission_order() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    // The fake debugger numbers every command it sees; FIFO execution means
    // the first submission gets the first number.
    let first = manager.execute(started.session_id, "alpha");
    let second = manager.execute(started.session_id, "beta");
    let third = manager.execute(started.session_id, "gamma");
    let (first, second, third) = tokio::join!(first, second, third);

    for (result, expected) in [(first, "1:alpha"), (second, "2:beta"), (third, "3:gamma")] {
        match result {
            Ok(output) => assert!(
                output.output.contains(expected),
                "expected {expected:?} in {:?}",
                output.output
            ),
            Err(err) => panic!("execute failed: {err}"),
        }
    }

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pager_pages_are_drained_into_one_output() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    let result = run(&manager, started.session_id, "pages").await;
    let one = result.output.find("page-one");
    let two = result.output.find("page-two");
    let three = result.output.find("page-three");
    match (one, two, three) {
        (Some(one), Some(two), Some(three)) => {
            assert!(one < two && two < three, "pages out of order: {result:?}");
        }
        _ => panic!("missing pager pages in {:?}", result.output),
    }
    assert!(!result.output.contains("--Type <return>"));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_timeout_yields_partial_output_not_an_error() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    let result = run(&manager, started.session_id, "hang").await;
    assert!(result.output.contains("partial output without a prompt"));

    // The process is still alive and the session keeps working.
    let follow_up = run(&manager, started.session_id, "still here").await;
    assert!(follow_up.output.contains(":still here"));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submission_timeout_fails_the_submitter_but_the_command_still_runs() {
    let mut profile = fake_profile();
    profile.read_timeout = Duration::from_secs(5);
    profile.submission_timeout = Duration::from_millis(300);
    let manager = SessionManager::new(profile);
    let started = start_session(&manager).await;

    // The fake debugger sleeps for 2 s on `slow`, well past the ceiling.
    match manager.execute(started.session_id, "slow").await {
        Err(SessionError::Timeout { session_id }) => {
            assert_eq!(session_id, started.session_id);
        }
        other => panic!("expected submission timeout, got {other:?}"),
    }

    // The ceiling does not dequeue the command: it still executes in order
    // and the worker discards its unclaimed result. The counter shows it ran.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let follow_up = run(&manager, started.session_id, "after").await;
    assert!(follow_up.output.contains("2:after"));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn process_death_marks_the_session_inactive() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    // The stream closes mid-command; the tail read after the last prompt
    // boundary is dropped, so the round trip completes with empty output.
    let result = run(&manager, started.session_id, "die").await;
    assert_eq!(result.output, "");

    // The exit flag is flipped by the blocking wait thread; give it a beat.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let summaries = manager.list().await;
    let summary = match summaries
        .iter()
        .find(|summary| summary.session_id == started.session_id)
    {
        Some(summary) => summary,
        None => panic!("dead session should stay listed until terminated"),
    };
    assert!(!summary.is_active);
    assert_eq!(summary.pid, None);

    match manager.execute(started.session_id, "anything").await {
        Err(SessionError::Inactive { session_id }) => {
            assert_eq!(session_id, started.session_id);
        }
        other => panic!("expected inactive error, got {other:?}"),
    }

    // Terminate still cleans up an already-dead session.
    match manager.terminate(started.session_id).await {
        Ok(_) => {}
        Err(err) => panic!("terminate failed: {err}"),
    }
    assert!(manager.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_ids_are_not_found() {
    let manager = SessionManager::new(fake_profile());

    match manager.execute(unknown_session_id(), "continue").await {
        Err(SessionError::NotFound { .. }) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    match manager.terminate(unknown_session_id()).await {
        Err(SessionError::NotFound { .. }) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    assert!(manager.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_is_not_found_after_the_first_call() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    match manager.terminate(started.session_id).await {
        Ok(_) => {}
        Err(err) => panic!("terminate failed: {err}"),
    }
    match manager.terminate(started.session_id).await {
        Err(SessionError::NotFound { session_id }) => {
            assert_eq!(session_id, started.session_id);
        }
        other => panic!("expected not found, got {other:?}"),
    }
    match manager.execute(started.session_id, "continue").await {
        Err(SessionError::NotFound { .. }) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_are_independent_sessions() {
    let manager = SessionManager::new(fake_profile());

    let (first, second) = tokio::join!(
        manager.start(StartParams::default()),
        manager.start(StartParams::default())
    );
    let (first, second) = match (first, second) {
        (Ok(first), Ok(second)) => (first, second),
        (first, second) => panic!("concurrent starts failed: {first:?} / {second:?}"),
    };
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(manager.list().await.len(), 2);

    match manager.terminate(first.session_id).await {
        Ok(_) => {}
        Err(err) => panic!("terminate failed: {err}"),
    }

    // The surviving session is untouched.
    let result = run(&manager, second.session_id, "ping").await;
    assert!(result.output.contains("1:ping"));

    manager.shutdown().await;
    assert!(manager.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_types_serialize_for_the_dispatch_layer() {
    let manager = SessionManager::new(fake_profile());
    let started = start_session(&manager).await;

    let value = match serde_json::to_value(&started) {
        Ok(value) => value,
        Err(err) => panic!("serialize failed: {err}"),
    };
    assert_eq!(
        value["session_id"],
        serde_json::Value::String(started.session_id.to_string())
    );
    assert!(value["pid"].is_u64());

    let result = run(&manager, started.session_id, "ok").await;
    let value = match serde_json::to_value(&result) {
        Ok(value) => value,
        Err(err) => panic!("serialize failed: {err}"),
    };
    assert_eq!(value["command"], "ok");

    manager.shutdown().await;
}

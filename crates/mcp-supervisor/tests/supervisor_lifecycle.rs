#![cfg(unix)]

mod common;

use common::*;

use mcp_config::SupervisorConfig;
use mcp_supervisor::{
    ConnectionState, DISABLED_MESSAGE, PROCESS_EXITED_MESSAGE, SHUTDOWN_MESSAGE, ServerDescriptor,
};

use std::time::{Duration, Instant};

use googletest::assert_that;
use googletest::prelude::{anything, contains_substring, eq, not, some};

// =========================================================================
// Start
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_unreferenced_id_when_status_then_disconnected_without_message() {
    // Given
    let (supervisor, _launcher) = supervisor();

    // When
    let record = supervisor.status(&server_id("never")).borrow().clone();

    // Then
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_disabled_descriptor_when_start_then_disconnected_and_never_launched() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("disabled").with_enabled(false);

    // When
    supervisor.start(descriptor.clone()).await;
    grace_elapsed().await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(
        record.state,
        eq(&ConnectionState::disconnected_because(DISABLED_MESSAGE))
    );
    assert_that!(launcher.launches(), eq(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_command_with_embedded_space_when_start_then_malformed_error() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = ServerDescriptor::new(server_id("npx"), "npx", "npx -y some-server");

    // When
    supervisor.start(descriptor.clone()).await;
    let record = wait_error(&supervisor, &descriptor.id).await;

    // Then
    assert_that!(
        record.message(),
        some(contains_substring("split them into the argument list"))
    );
    assert_that!(record.message(), some(not(contains_substring("not found"))));
    assert_that!(launcher.launches(), eq(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_missing_command_when_start_then_not_found_error() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = ServerDescriptor::new(server_id("ghost"), "ghost", "mcps-not-installed");

    // When
    supervisor.start(descriptor.clone()).await;
    let record = wait_error(&supervisor, &descriptor.id).await;

    // Then
    assert_that!(record.message(), some(contains_substring("not found")));
    assert_that!(launcher.launches(), eq(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_long_running_server_when_start_then_connecting_then_connected() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("sleeper");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.state, eq(&ConnectionState::Connecting));

    wait_connected(&supervisor, &descriptor.id).await;
    assert!(supervisor.is_running(&descriptor.id).await);
    let pid = supervisor.pid(&descriptor.id).await;
    assert_that!(pid, some(anything()));
    assert!(pid_exists(pid.unwrap()));
    assert_that!(launcher.launches(), eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_stdio_server_when_start_then_stdin_held_open() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = ServerDescriptor::new(server_id("cat"), "cat", "cat");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    wait_connected(&supervisor, &descriptor.id).await;
    grace_elapsed().await;
    assert!(supervisor.is_running(&descriptor.id).await);

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_env_overlay_when_start_then_child_sees_variable() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell(
        "env",
        r#"[ "$MCPS_TEST_VALUE" = expected ] && [ -n "$PATH" ] || exit 7; sleep 30"#,
    )
    .with_env("MCPS_TEST_VALUE", "expected");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    wait_connected(&supervisor, &descriptor.id).await;

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_chatty_server_when_start_then_output_drained() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let script = r#"i=0
while [ $i -lt 4000 ]; do
  echo "line $i padding padding padding padding padding padding"
  i=$((i + 1))
done
exit 2"#;
    let descriptor = shell("chatty", script);

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    let record = wait_error(&supervisor, &descriptor.id).await;
    assert_that!(record.message(), some(contains_substring("exit code 2")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_non_utf8_output_when_start_then_pipe_kept_and_connected() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("binary", "printf '\\377\\n'; sleep 1; echo still-alive; sleep 30");

    // When
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    // Then
    assert!(supervisor.registry().current(&descriptor.id).is_connected());
    assert!(supervisor.is_running(&descriptor.id).await);

    supervisor.shutdown().await;
}

// =========================================================================
// Exit classification
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_clean_exit_within_grace_when_start_then_exited_too_quickly() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("quick", "exit 0");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    let record = wait_error(&supervisor, &descriptor.id).await;
    assert_that!(record.message(), some(eq("Process exited too quickly")));
    assert!(!supervisor.is_running(&descriptor.id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_failing_exit_within_grace_when_start_then_error_with_code_and_output() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("bad-args", "echo 'unknown flag --foo' >&2; exit 4");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    let record = wait_error(&supervisor, &descriptor.id).await;
    assert_that!(
        record.message(),
        some(eq("Process exited too quickly (exit code 4): unknown flag --foo"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_exit_while_output_still_open_when_grace_ends_then_exited_too_quickly() {
    // Given
    let (supervisor, _launcher) = supervisor_with(SupervisorConfig {
        drain_settle_ms: 2_000,
        ..fast_config()
    });
    let descriptor = shell("orphaned-pipe", "sleep 3 & exit 0");

    // When
    supervisor.start(descriptor.clone()).await;

    // Then
    let record = wait_for(&supervisor, &descriptor.id, |r| {
        !matches!(r.state, ConnectionState::Connecting)
    })
    .await;
    assert_that!(record.message(), some(eq("Process exited too quickly")));
    assert!(record.is_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_clean_exit_after_grace_then_disconnected_process_exited() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("finishes", "sleep 1; exit 0");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;

    // When
    let record = wait_for(&supervisor, &descriptor.id, |r| {
        matches!(r.state, ConnectionState::Disconnected(_))
    })
    .await;

    // Then
    assert_that!(record.message(), some(eq(PROCESS_EXITED_MESSAGE)));
    assert!(!supervisor.is_running(&descriptor.id).await);
    assert_that!(supervisor.live_count().await, eq(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_crash_after_grace_then_error_with_exit_code() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("crashes", "sleep 1; echo 'panic: out of tokens' >&2; exit 3");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;

    // When
    let record = wait_error(&supervisor, &descriptor.id).await;

    // Then
    assert_that!(
        record.message(),
        some(eq("Process exited with exit code 3: panic: out of tokens"))
    );
}

// =========================================================================
// Stop
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_start_when_stopped_within_10ms_then_ends_disconnected() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = sleeper("race");
    supervisor.start(descriptor.clone()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // When
    supervisor.stop(&descriptor.id).await;

    // Then
    let record = wait_for(&supervisor, &descriptor.id, |r| {
        r.state == ConnectionState::Disconnected(None)
    })
    .await;
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));

    grace_elapsed().await;
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));
    assert_that!(supervisor.live_count().await, eq(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_connected_server_when_stop_then_process_gone_and_disconnected() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = sleeper("stoppable");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    let pid = supervisor.pid(&descriptor.id).await.unwrap();

    // When
    supervisor.stop(&descriptor.id).await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));
    assert!(!pid_exists(pid));
    assert!(!supervisor.is_running(&descriptor.id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_server_ignoring_sigterm_when_stop_then_forced_after_timeout() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = shell("stubborn", "trap '' TERM; sleep 30");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    let pid = supervisor.pid(&descriptor.id).await.unwrap();

    // When
    let started = Instant::now();
    supervisor.stop(&descriptor.id).await;

    // Then
    assert!(started.elapsed() >= Duration::from_millis(STOP_TIMEOUT_MS));
    assert!(!pid_exists(pid));
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_no_process_when_stop_then_disconnected() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let id = server_id("idle");
    supervisor.registry().set(&id, ConnectionState::Error("old".into()));

    // When
    supervisor.stop(&id).await;

    // Then
    let record = supervisor.registry().current(&id);
    assert_that!(record.state, eq(&ConnectionState::Disconnected(None)));
}

// =========================================================================
// Restart
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_rapid_double_start_then_single_live_process() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = sleeper("twice");

    // When
    supervisor.start(descriptor.clone()).await;
    supervisor.start(descriptor.clone()).await;

    // Then
    wait_connected(&supervisor, &descriptor.id).await;
    assert_that!(supervisor.live_count().await, eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_connected_server_when_restart_then_previous_process_terminated() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("restart");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    let first_pid = supervisor.pid(&descriptor.id).await.unwrap();

    // When
    supervisor.restart(descriptor.clone()).await;
    wait_for(&supervisor, &descriptor.id, |r| {
        r.state == ConnectionState::Connecting
    })
    .await;
    wait_connected(&supervisor, &descriptor.id).await;

    // Then
    let second_pid = supervisor.pid(&descriptor.id).await.unwrap();
    assert_that!(second_pid, not(eq(first_pid)));
    assert!(!pid_exists(first_pid));
    assert_that!(launcher.launches(), eq(2));
    assert_that!(supervisor.live_count().await, eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_running_server_when_started_disabled_then_process_stopped() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let descriptor = sleeper("toggle");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    let pid = supervisor.pid(&descriptor.id).await.unwrap();

    // When
    supervisor.start(descriptor.clone().with_enabled(false)).await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.message(), some(eq(DISABLED_MESSAGE)));
    let deadline = Instant::now() + SETTLE;
    while pid_exists(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!pid_exists(pid));
}

// =========================================================================
// Health check
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_connected_server_when_check_status_then_connected_without_relaunch() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("healthy");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;

    // When
    supervisor.check_status(descriptor.clone()).await;

    // Then
    assert!(supervisor.registry().current(&descriptor.id).is_connected());
    assert_that!(launcher.launches(), eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_exited_server_when_check_status_then_started_again() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = shell("flaky", "sleep 1; exit 1");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    wait_error(&supervisor, &descriptor.id).await;

    // When
    supervisor.check_status(descriptor.clone()).await;

    // Then
    wait_connected(&supervisor, &descriptor.id).await;
    assert_that!(launcher.launches(), eq(2));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_process_in_grace_period_when_check_status_then_connected_without_relaunch() {
    // Given
    let (supervisor, launcher) = supervisor_with(SupervisorConfig {
        grace_period_ms: 5_000,
        ..fast_config()
    });
    let descriptor = sleeper("warming");
    supervisor.start(descriptor.clone()).await;
    wait_for_pid(&supervisor, &descriptor.id).await;

    // When
    supervisor.check_status(descriptor.clone()).await;

    // Then
    assert!(supervisor.registry().current(&descriptor.id).is_connected());
    assert_that!(launcher.launches(), eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_disabled_server_still_stopping_when_check_status_enabled_then_started() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = shell("reenabled", "trap '' TERM; sleep 30");
    supervisor.start(descriptor.clone()).await;
    wait_connected(&supervisor, &descriptor.id).await;
    let first_pid = supervisor.pid(&descriptor.id).await.unwrap();
    supervisor.start(descriptor.clone().with_enabled(false)).await;

    // When
    supervisor.check_status(descriptor.clone()).await;

    // Then
    wait_connected(&supervisor, &descriptor.id).await;
    let second_pid = supervisor.pid(&descriptor.id).await.unwrap();
    assert_that!(second_pid, not(eq(first_pid)));
    assert_that!(launcher.launches(), eq(2));
    assert_that!(supervisor.live_count().await, eq(1));

    supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_disabled_server_without_process_when_check_status_then_disabled() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("off").with_enabled(false);

    // When
    supervisor.check_status(descriptor.clone()).await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert_that!(record.message(), some(eq(DISABLED_MESSAGE)));
    assert_that!(launcher.launches(), eq(0));
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_running_servers_when_shutdown_then_all_killed_and_registry_frozen() {
    // Given
    let (supervisor, _launcher) = supervisor();
    let first = sleeper("first");
    let second = shell("second", "trap '' TERM; sleep 30");
    supervisor.start(first.clone()).await;
    supervisor.start(second.clone()).await;
    wait_connected(&supervisor, &first.id).await;
    wait_connected(&supervisor, &second.id).await;
    let pids = [
        supervisor.pid(&first.id).await.unwrap(),
        supervisor.pid(&second.id).await.unwrap(),
    ];

    // When
    supervisor.shutdown().await;

    // Then
    assert_that!(supervisor.live_count().await, eq(0));
    assert!(pids.iter().all(|pid| !pid_exists(*pid)));
    let record = supervisor.registry().current(&first.id);
    assert_that!(record.message(), some(eq(SHUTDOWN_MESSAGE)));

    supervisor.start(first.clone()).await;
    supervisor.stop(&second.id).await;
    grace_elapsed().await;
    assert_that!(
        supervisor.registry().current(&first.id).message(),
        some(eq(SHUTDOWN_MESSAGE))
    );
    assert_that!(
        supervisor.registry().current(&second.id).message(),
        some(eq(SHUTDOWN_MESSAGE))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_start_in_grace_period_when_shutdown_then_never_connected() {
    // Given
    let (supervisor, launcher) = supervisor();
    let descriptor = sleeper("pending");
    supervisor.start(descriptor.clone()).await;

    // When
    supervisor.shutdown().await;
    grace_elapsed().await;

    // Then
    let record = supervisor.registry().current(&descriptor.id);
    assert!(!record.is_connected());
    assert_that!(supervisor.live_count().await, eq(0));
    assert!(launcher.launches() <= 1);
}

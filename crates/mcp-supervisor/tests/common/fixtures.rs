use mcp_config::SupervisorConfig;
use mcp_supervisor::{
    Launcher, NativeLauncher, ServerDescriptor, ServerId, StatusRecord, Supervisor,
    SupervisorResult,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::process::Child;

pub const GRACE_MS: u64 = 300;
pub const STOP_TIMEOUT_MS: u64 = 1_000;

/// Upper bound for any single state transition in these tests
pub const SETTLE: Duration = Duration::from_secs(6);

/// Native launcher that counts how often it was asked to spawn.
#[derive(Default)]
pub struct CountingLauncher {
    launches: AtomicUsize,
}

impl CountingLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for CountingLauncher {
    fn launch(&self, descriptor: &ServerDescriptor) -> SupervisorResult<Child> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        NativeLauncher.launch(descriptor)
    }
}

pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        grace_period_ms: GRACE_MS,
        stop_timeout_ms: STOP_TIMEOUT_MS,
        probe_timeout_ms: 2_000,
        drain_settle_ms: 100,
        output_tail_lines: 20,
    }
}

pub fn supervisor() -> (Supervisor, Arc<CountingLauncher>) {
    supervisor_with(fast_config())
}

pub fn supervisor_with(config: SupervisorConfig) -> (Supervisor, Arc<CountingLauncher>) {
    let launcher = Arc::new(CountingLauncher::default());
    let supervisor = Supervisor::with_launcher(config, launcher.clone());
    (supervisor, launcher)
}

/// Poll until the server has a live process and return its pid.
pub async fn wait_for_pid(supervisor: &Supervisor, id: &ServerId) -> u32 {
    let deadline = tokio::time::Instant::now() + SETTLE;
    loop {
        if let Some(pid) = supervisor.pid(id).await {
            return pid;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for a process for {id}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn server_id(value: &str) -> ServerId {
    ServerId::new(value).unwrap()
}

/// Descriptor running `script` through `sh -c`.
pub fn shell(id: &str, script: &str) -> ServerDescriptor {
    ServerDescriptor::new(server_id(id), id, "sh").with_args(["-c", script])
}

pub fn sleeper(id: &str) -> ServerDescriptor {
    ServerDescriptor::new(server_id(id), id, "sleep").with_args(["30"])
}

/// Wait until the server's record satisfies `predicate`, panicking with
/// the last record seen after `SETTLE`.
pub async fn wait_for<F>(supervisor: &Supervisor, id: &ServerId, predicate: F) -> StatusRecord
where
    F: Fn(&StatusRecord) -> bool,
{
    let mut rx = supervisor.status(id);
    let matched = tokio::time::timeout(SETTLE, rx.wait_for(|record| predicate(record)))
        .await
        .ok()
        .and_then(|result| result.ok().map(|record| (*record).clone()));

    match matched {
        Some(record) => record,
        None => panic!("timed out waiting for {id}; last record {:?}", *rx.borrow()),
    }
}

pub async fn wait_connected(supervisor: &Supervisor, id: &ServerId) -> StatusRecord {
    wait_for(supervisor, id, StatusRecord::is_connected).await
}

pub async fn wait_error(supervisor: &Supervisor, id: &ServerId) -> StatusRecord {
    wait_for(supervisor, id, StatusRecord::is_error).await
}

/// Whether the OS still knows the pid.
pub fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub async fn grace_elapsed() {
    tokio::time::sleep(Duration::from_millis(GRACE_MS * 2)).await;
}

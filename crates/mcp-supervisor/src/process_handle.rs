//! Live OS process owned by the supervisor.

use crate::exit_watcher::ExitWatcher;
use crate::output_drain::spawn_output_drain;
use crate::process_table::ProcessSlot;
use crate::task_guard::TaskGuard;
use crate::{OutputTail, ProcessExit, ServerId, StatusRegistry};

use std::sync::Arc;
use std::time::Duration;

use mcp_config::SupervisorConfig;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{info, warn};

/// How long to wait for the OS to reap a process after a forced kill.
const FORCE_KILL_WAIT: Duration = Duration::from_secs(2);

pub(crate) struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    confirmed: bool,
    stdin: Option<ChildStdin>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    drained_rx: watch::Receiver<bool>,
    tail: Arc<OutputTail>,
    watcher: TaskGuard,
}

impl ProcessHandle {
    /// Take ownership of a freshly launched child and start its drain and
    /// exit watcher tasks.
    pub(crate) fn monitor(
        server_id: &ServerId,
        generation: u64,
        mut child: Child,
        slot: Arc<Mutex<ProcessSlot>>,
        registry: StatusRegistry,
        config: &SupervisorConfig,
    ) -> Self {
        let pid = child.id();
        let stdin = child.stdin.take();
        let tail = Arc::new(OutputTail::new(config.output_tail_lines));

        let drain = TaskGuard::new(spawn_output_drain(
            server_id.clone(),
            child.stdout.take(),
            child.stderr.take(),
            Arc::clone(&tail),
        ));

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let (drained_tx, drained_rx) = watch::channel(false);

        let watcher = ExitWatcher {
            server_id: server_id.clone(),
            generation,
            child,
            kill_rx,
            exit_tx,
            drained_tx,
            drain,
            drain_settle: config.drain_settle(),
            tail: Arc::clone(&tail),
            slot,
            registry,
        };
        let watcher = TaskGuard::new(tokio::spawn(watcher.run()));

        Self {
            generation,
            pid,
            confirmed: false,
            stdin,
            kill_tx: Some(kill_tx),
            exit_rx,
            drained_rx,
            tail,
            watcher,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub(crate) fn confirm(&mut self) {
        self.confirmed = true;
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    pub(crate) fn exit(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    pub(crate) fn exit_receiver(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    pub(crate) fn last_output(&self) -> Option<String> {
        self.tail.last_line()
    }

    /// Wait until the output of an exited process has been read to the end,
    /// or `timeout` passes. Returns at once if the watcher is gone.
    pub(crate) async fn wait_drained(&mut self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.drained_rx.wait_for(|drained| *drained)).await;
    }

    /// Called by the exit watcher when it reaps its own handle.
    pub(crate) fn release_watcher(self) {
        let Self { watcher, .. } = self;
        watcher.detach();
    }

    /// Ask the process to exit, then force it after `timeout`.
    ///
    /// Closes stdin and sends SIGTERM to the process group (CTRL_BREAK on
    /// Windows). Returns once the process is gone or the forced kill has
    /// been given up on.
    pub(crate) async fn terminate(mut self, server_id: &ServerId, timeout: Duration) {
        if !self.is_alive() {
            return;
        }

        drop(self.stdin.take());
        self.signal_graceful(server_id);

        if self.wait_exit(timeout).await {
            info!(server_id = %server_id, pid = self.pid, "Process exited after graceful request");
            return;
        }

        warn!(
            server_id = %server_id,
            pid = self.pid,
            "Process ignored graceful termination for {}ms, forcing",
            timeout.as_millis()
        );
        self.force_kill(server_id).await;
    }

    /// Forced termination without a graceful phase.
    pub(crate) async fn kill(mut self, server_id: &ServerId) {
        if self.is_alive() {
            self.force_kill(server_id).await;
        }
    }

    async fn force_kill(&mut self, server_id: &ServerId) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).ok();
            }
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        if !self.wait_exit(FORCE_KILL_WAIT).await {
            warn!(server_id = %server_id, pid = self.pid, "Process still running after forced kill");
        }
    }

    fn signal_graceful(&self, server_id: &ServerId) {
        let Some(pid) = self.pid else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            info!(server_id = %server_id, "Sending SIGTERM to process group {pid}");
            killpg(Pid::from_raw(pid as i32), Signal::SIGTERM).ok();
        }

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Console::{CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent};

            info!(server_id = %server_id, "Sending CTRL_BREAK to pid {pid}");
            unsafe {
                GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
            }
        }

        #[cfg(not(any(unix, windows)))]
        let _ = server_id;
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.exit_rx.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        )
    }
}

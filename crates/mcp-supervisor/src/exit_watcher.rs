//! Waits for a managed process to end and reports how it ended.

use crate::process_table::ProcessSlot;
use crate::task_guard::TaskGuard;
use crate::{
    ConnectionState, OutputTail, PROCESS_EXITED_MESSAGE, ProcessExit, ServerId, StatusRegistry,
    SupervisorError,
};

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{info, warn};

pub(crate) struct ExitWatcher {
    pub(crate) server_id: ServerId,
    pub(crate) generation: u64,
    pub(crate) child: Child,
    pub(crate) kill_rx: oneshot::Receiver<()>,
    pub(crate) exit_tx: watch::Sender<Option<ProcessExit>>,
    pub(crate) drained_tx: watch::Sender<bool>,
    pub(crate) drain: TaskGuard,
    pub(crate) drain_settle: Duration,
    pub(crate) tail: Arc<OutputTail>,
    pub(crate) slot: Arc<Mutex<ProcessSlot>>,
    pub(crate) registry: StatusRegistry,
}

impl ExitWatcher {
    /// Runs until the process exits.
    ///
    /// Only the generation that owns the slot's handle reaps it. A
    /// caller-initiated stop or restart bumps the generation first, so a
    /// lagging exit here never overwrites the Disconnected it publishes.
    /// Before the launch is confirmed the start sequence does the reaping.
    pub(crate) async fn run(mut self) {
        let exit = self.wait_for_exit().await;
        self.exit_tx.send_replace(Some(exit));

        // The final lines may still be in the pipe; settle before reading the tail.
        let _ = tokio::time::timeout(self.drain_settle, self.drain.join()).await;
        drop(self.drain);
        self.drained_tx.send_replace(true);

        let mut slot = self.slot.lock().await;
        let Some(handle) = slot.take_confirmed(self.generation) else {
            return;
        };
        handle.release_watcher();

        let state = exit_state(exit, self.tail.last_line());
        info!(
            server_id = %self.server_id,
            generation = self.generation,
            "Process exited ({exit})"
        );
        self.registry.set(&self.server_id, state);
    }

    async fn wait_for_exit(&mut self) -> ProcessExit {
        let mut kill_requested = false;
        loop {
            tokio::select! {
                status = self.child.wait() => {
                    return match status {
                        Ok(status) => ProcessExit::from_status(status),
                        Err(e) => {
                            warn!(server_id = %self.server_id, "Failed waiting for process: {e}");
                            ProcessExit::unknown()
                        }
                    };
                }
                request = &mut self.kill_rx, if !kill_requested => {
                    kill_requested = true;
                    if request.is_ok()
                        && let Err(e) = self.child.start_kill()
                    {
                        warn!(server_id = %self.server_id, "Failed to kill process: {e}");
                    }
                }
            }
        }
    }
}

/// Status after a confirmed process ends on its own.
pub(crate) fn exit_state(exit: ProcessExit, last_output: Option<String>) -> ConnectionState {
    if exit.success() {
        ConnectionState::disconnected_because(PROCESS_EXITED_MESSAGE)
    } else {
        ConnectionState::Error(SupervisorError::non_zero_exit(exit, last_output).diagnostic())
    }
}

//! Orchestrates start, stop and health-check requests.

use crate::launcher::validate_command;
use crate::process_handle::ProcessHandle;
use crate::process_table::{PendingTask, ProcessSlot, ProcessTable};
use crate::task_guard::TaskGuard;
use crate::{
    ConnectionState, DISABLED_MESSAGE, Launcher, NativeLauncher, ProcessExit, SHUTDOWN_MESSAGE,
    ServerDescriptor, ServerId, StatusRecord, StatusRegistry, SupervisorError,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mcp_config::SupervisorConfig;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Owns the process table and drives each server through
/// Disconnected, Connecting, Connected and Error.
///
/// `start`, `stop` and `check_status` never fail: every problem ends up as
/// an Error [`ConnectionState`] in the [`StatusRegistry`]. Launch and
/// liveness confirmation run on a spawned task, so `start` returns as soon
/// as Connecting is published and servers come up in parallel.
///
/// Each server id has its own slot lock and a generation counter. A start,
/// stop or shutdown advances the generation and cancels whatever start was
/// still in flight; background work for an older generation never
/// publishes.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

struct Shared {
    config: SupervisorConfig,
    launcher: Arc<dyn Launcher>,
    table: ProcessTable,
    registry: StatusRegistry,
    shutting_down: AtomicBool,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_launcher(config, Arc::new(NativeLauncher))
    }

    pub fn with_launcher(config: SupervisorConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self::with_registry(config, launcher, StatusRegistry::new())
    }

    /// Publish into a registry owned by the caller.
    pub fn with_registry(
        config: SupervisorConfig,
        launcher: Arc<dyn Launcher>,
        registry: StatusRegistry,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                launcher,
                table: ProcessTable::default(),
                registry,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Launch the server, replacing any process already running for its id.
    ///
    /// A disabled descriptor publishes `Disconnected("server disabled")`
    /// without touching the launcher; a process left over from an earlier
    /// start is terminated in the background.
    pub async fn start(&self, descriptor: ServerDescriptor) {
        if self.is_shutting_down() {
            debug!(server_id = %descriptor.id, "Ignoring start during shutdown");
            return;
        }

        let server_id = descriptor.id.clone();
        let slot = self.shared.table.slot(&server_id);
        let mut guard = slot.lock().await;
        if self.is_shutting_down() {
            return;
        }
        let generation = guard.advance();

        if !descriptor.enabled {
            info!(server_id = %server_id, "Server disabled, not launching");
            self.shared.registry.set(
                &server_id,
                ConnectionState::disconnected_because(DISABLED_MESSAGE),
            );
            let task = tokio::spawn(Arc::clone(&self.shared).retire(
                server_id,
                generation,
                Arc::clone(&slot),
            ));
            guard.set_pending(PendingTask::Retire, TaskGuard::new(task));
            return;
        }

        info!(
            server_id = %server_id,
            generation,
            "Starting server '{}'",
            descriptor.name
        );
        self.shared
            .registry
            .set(&server_id, ConnectionState::Connecting);

        let task = tokio::spawn(Arc::clone(&self.shared).run_start(
            descriptor,
            generation,
            Arc::clone(&slot),
        ));
        guard.set_pending(PendingTask::Start, TaskGuard::new(task));
    }

    pub async fn restart(&self, descriptor: ServerDescriptor) {
        self.start(descriptor).await;
    }

    /// Terminate the server's process, if any, and publish Disconnected.
    ///
    /// Interrupts a start that is still launching or waiting out its grace
    /// period. Returns once the process is gone.
    pub async fn stop(&self, server_id: &ServerId) {
        let slot = self.shared.table.slot(server_id);
        {
            let mut guard = slot.lock().await;
            guard.advance();

            if let Some(handle) = guard.take_handle() {
                info!(server_id = %server_id, pid = handle.pid(), "Stopping server");
                handle
                    .terminate(server_id, self.shared.config.stop_timeout())
                    .await;
            }

            self.shared
                .registry
                .set(server_id, ConnectionState::disconnected());
        }

        if self.shared.table.remove_if_idle(server_id, &slot) {
            debug!(server_id = %server_id, "Released idle slot");
        }
    }

    /// Health check driven by the host.
    ///
    /// A live process is Connected, even inside its grace period. A start
    /// that has not launched yet is left alone. Anything else is started
    /// again if enabled.
    pub async fn check_status(&self, descriptor: ServerDescriptor) {
        if self.is_shutting_down() {
            return;
        }

        {
            let slot = self.shared.table.slot(&descriptor.id);
            let guard = slot.lock().await;
            if guard.live_handle().is_some() {
                self.shared
                    .registry
                    .set(&descriptor.id, ConnectionState::Connected);
                return;
            }
            if guard.start_in_progress() {
                debug!(server_id = %descriptor.id, "Start in progress, skipping check");
                return;
            }
        }

        if descriptor.enabled {
            info!(server_id = %descriptor.id, "No live process, starting");
            self.start(descriptor).await;
        } else {
            self.shared.registry.set(
                &descriptor.id,
                ConnectionState::disconnected_because(DISABLED_MESSAGE),
            );
        }
    }

    /// Force-kill every process, cancel every background task and close the
    /// registry. Later calls are ignored.
    pub async fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots = self.shared.table.drain_all();
        info!("Shutting down supervisor ({} server(s))", slots.len());

        let stops = slots.into_iter().map(|(server_id, slot)| {
            let registry = self.shared.registry.clone();
            async move {
                let mut guard = slot.lock().await;
                let was_starting = guard.start_in_progress();
                guard.advance();

                let handle = guard.take_handle();
                let was_running = handle.as_ref().is_some_and(ProcessHandle::is_alive);
                if let Some(handle) = handle {
                    handle.kill(&server_id).await;
                }

                if was_running || was_starting {
                    registry.set(
                        &server_id,
                        ConnectionState::disconnected_because(SHUTDOWN_MESSAGE),
                    );
                }
            }
        });
        futures::future::join_all(stops).await;

        self.shared.registry.close();
        info!("Supervisor shut down");
    }

    pub fn status(&self, server_id: &ServerId) -> watch::Receiver<StatusRecord> {
        self.shared.registry.get(server_id)
    }

    pub fn all_statuses(&self) -> HashMap<ServerId, watch::Receiver<StatusRecord>> {
        self.shared.registry.get_all()
    }

    /// OS process id of the server's live process.
    pub async fn pid(&self, server_id: &ServerId) -> Option<u32> {
        let slot = self.shared.table.existing(server_id)?;
        let guard = slot.lock().await;
        guard.live_handle().and_then(ProcessHandle::pid)
    }

    pub async fn is_running(&self, server_id: &ServerId) -> bool {
        match self.shared.table.existing(server_id) {
            Some(slot) => slot.lock().await.live_handle().is_some(),
            None => false,
        }
    }

    /// Number of servers with a live process.
    pub async fn live_count(&self) -> usize {
        let mut count = 0;
        for slot in self.shared.table.all() {
            if slot.lock().await.live_handle().is_some() {
                count += 1;
            }
        }
        count
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Dropping a handle aborts its watcher; the child is killed on drop.
        for (_, slot) in self.table.drain_all() {
            if let Ok(mut guard) = slot.try_lock() {
                guard.advance();
                guard.take_handle();
            }
        }
    }
}

impl Shared {
    /// Replace the previous process, launch and wait out the grace period.
    async fn run_start(
        self: Arc<Self>,
        descriptor: ServerDescriptor,
        generation: u64,
        slot: Arc<Mutex<ProcessSlot>>,
    ) {
        let server_id = &descriptor.id;

        {
            let mut guard = slot.lock().await;
            if !guard.is_current(generation) {
                return;
            }
            if let Some(previous) = guard.take_handle() {
                info!(
                    server_id = %server_id,
                    pid = previous.pid(),
                    "Terminating previous process before relaunch"
                );
                previous
                    .terminate(server_id, self.config.stop_timeout())
                    .await;
            }
        }

        if let Err(e) = validate_command(&descriptor.command) {
            self.fail(server_id, generation, &slot, e).await;
            return;
        }

        let launcher = Arc::clone(&self.launcher);
        let command = descriptor.command.clone();
        let timeout = self.config.probe_timeout();
        let available =
            tokio::task::spawn_blocking(move || launcher.is_available(&command, timeout))
                .await
                .unwrap_or(false);
        if !available {
            let e = SupervisorError::command_not_found(&descriptor.command);
            self.fail(server_id, generation, &slot, e).await;
            return;
        }

        let mut exit_rx = {
            let mut guard = slot.lock().await;
            if !guard.is_current(generation) {
                return;
            }

            let child = match self.launcher.launch(&descriptor) {
                Ok(child) => child,
                Err(e) => {
                    warn!(server_id = %server_id, "Launch failed: {e}");
                    self.registry
                        .set(server_id, ConnectionState::Error(e.diagnostic()));
                    return;
                }
            };

            let handle = ProcessHandle::monitor(
                server_id,
                generation,
                child,
                Arc::clone(&slot),
                self.registry.clone(),
                &self.config,
            );
            let exit_rx = handle.exit_receiver();
            guard.register(handle);
            exit_rx
        };

        tokio::select! {
            _ = tokio::time::sleep(self.config.grace_period()) => {}
            _ = exit_rx.wait_for(Option::is_some) => {}
        }

        let mut guard = slot.lock().await;
        if !guard.is_current(generation) {
            return;
        }
        let Some(handle) = guard.handle_mut() else {
            return;
        };

        if handle.is_alive() {
            handle.confirm();
            info!(server_id = %server_id, pid = handle.pid(), "Server connected");
            self.registry.set(server_id, ConnectionState::Connected);
            return;
        }

        handle.wait_drained(self.config.drain_settle()).await;
        let exit = handle.exit().unwrap_or_else(ProcessExit::unknown);
        let output = handle.last_output();
        guard.take_handle();

        let e = SupervisorError::exited_too_quickly(exit, output);
        warn!(server_id = %server_id, "{e}");
        self.registry
            .set(server_id, ConnectionState::Error(e.diagnostic()));
    }

    /// Terminate whatever a disabled server still has running.
    async fn retire(
        self: Arc<Self>,
        server_id: ServerId,
        generation: u64,
        slot: Arc<Mutex<ProcessSlot>>,
    ) {
        let mut guard = slot.lock().await;
        if !guard.is_current(generation) {
            return;
        }
        if let Some(handle) = guard.take_handle() {
            info!(server_id = %server_id, pid = handle.pid(), "Stopping disabled server");
            handle
                .terminate(&server_id, self.config.stop_timeout())
                .await;
        }
    }

    async fn fail(
        &self,
        server_id: &ServerId,
        generation: u64,
        slot: &Mutex<ProcessSlot>,
        error: SupervisorError,
    ) {
        let guard = slot.lock().await;
        if !guard.is_current(generation) {
            return;
        }
        warn!(server_id = %server_id, "Cannot start server: {error}");
        self.registry
            .set(server_id, ConnectionState::Error(error.diagnostic()));
    }
}

use crate::ServerId;
use crate::process_handle::ProcessHandle;
use crate::task_guard::TaskGuard;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::Mutex;

/// Per-server slots, each behind its own async lock.
///
/// Operations on one server serialize on that server's slot; different
/// servers never wait on each other.
#[derive(Default)]
pub(crate) struct ProcessTable {
    slots: std::sync::Mutex<HashMap<ServerId, Arc<Mutex<ProcessSlot>>>>,
}

impl ProcessTable {
    /// Slot for `server_id`, created empty on first use.
    pub(crate) fn slot(&self, server_id: &ServerId) -> Arc<Mutex<ProcessSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(server_id.clone()).or_default())
    }

    pub(crate) fn existing(&self, server_id: &ServerId) -> Option<Arc<Mutex<ProcessSlot>>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(server_id).cloned()
    }

    pub(crate) fn all(&self) -> Vec<Arc<Mutex<ProcessSlot>>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().cloned().collect()
    }

    /// Empty the table, handing back every slot.
    /// Forget `server_id`'s slot if nothing else refers to it and it holds
    /// neither a process nor a task. Returns whether it was removed.
    pub(crate) fn remove_if_idle(
        &self,
        server_id: &ServerId,
        slot: &Arc<Mutex<ProcessSlot>>,
    ) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = slots.get(server_id) else {
            return false;
        };
        // The map and the caller; any other holder may still lock it.
        if !Arc::ptr_eq(stored, slot) || Arc::strong_count(slot) > 2 {
            return false;
        }
        let idle = slot
            .try_lock()
            .is_ok_and(|guard| guard.handle.is_none() && guard.pending.is_none());
        if idle {
            slots.remove(server_id);
        }
        idle
    }

    pub(crate) fn drain_all(&self) -> Vec<(ServerId, Arc<Mutex<ProcessSlot>>)> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.drain().collect()
    }
}

/// What the supervisor owns for one server id.
///
/// `generation` increases with every start, stop and shutdown. Background
/// tasks remember the generation they were created for and give up once
/// it has moved on.
#[derive(Default)]
pub(crate) struct ProcessSlot {
    generation: u64,
    handle: Option<ProcessHandle>,
    pending: Option<(PendingTask, TaskGuard)>,
}

/// Background work a slot may have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingTask {
    /// Launch and grace-period confirmation.
    Start,
    /// Terminating the process of a server that was disabled.
    Retire,
}

impl ProcessSlot {
    /// Begin a new generation, cancelling any start still in flight.
    pub(crate) fn advance(&mut self) -> u64 {
        self.pending.take();
        self.generation += 1;
        self.generation
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub(crate) fn set_pending(&mut self, kind: PendingTask, task: TaskGuard) {
        self.pending = Some((kind, task));
    }

    pub(crate) fn start_in_progress(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(kind, task)| *kind == PendingTask::Start && !task.is_finished())
    }

    pub(crate) fn register(&mut self, handle: ProcessHandle) {
        self.handle = Some(handle);
    }

    pub(crate) fn handle_mut(&mut self) -> Option<&mut ProcessHandle> {
        self.handle.as_mut()
    }

    /// The current generation's handle, if its process has not exited yet.
    pub(crate) fn live_handle(&self) -> Option<&ProcessHandle> {
        self.handle
            .as_ref()
            .filter(|handle| handle.generation() == self.generation && handle.is_alive())
    }

    pub(crate) fn take_handle(&mut self) -> Option<ProcessHandle> {
        self.handle.take()
    }

    /// Remove the handle only if `generation` is still current, the handle
    /// belongs to it and its launch was confirmed.
    pub(crate) fn take_confirmed(&mut self, generation: u64) -> Option<ProcessHandle> {
        let owned = self.is_current(generation)
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| handle.generation() == generation && handle.is_confirmed());
        if owned { self.handle.take() } else { None }
    }
}

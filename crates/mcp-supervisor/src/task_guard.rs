use tokio::task::JoinHandle;

/// Aborts the wrapped task when dropped.
///
/// Ties a background task to the value that owns it instead of leaving it
/// detached on the runtime.
pub(crate) struct TaskGuard(Option<JoinHandle<()>>);

impl TaskGuard {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.0.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task to end on its own.
    pub(crate) async fn join(&mut self) {
        if let Some(handle) = self.0.as_mut() {
            let _ = handle.await;
        }
    }

    /// Let the task run to completion without the guard.
    pub(crate) fn detach(mut self) {
        self.0.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

use crate::{ServerDescriptor, ServerId, StatusRecord, Supervisor};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::watch;

/// Contract shared by the real supervisor and the unsupported-platform
/// stand-in.
///
/// None of the operations report errors to the caller; outcomes are
/// observed through the status receivers.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn start(&self, descriptor: ServerDescriptor);

    async fn stop(&self, server_id: &ServerId);

    async fn check_status(&self, descriptor: ServerDescriptor);

    /// Process-wide teardown. No status is published afterwards.
    async fn shutdown(&self);

    fn status(&self, server_id: &ServerId) -> watch::Receiver<StatusRecord>;

    fn all_statuses(&self) -> HashMap<ServerId, watch::Receiver<StatusRecord>>;
}

#[async_trait]
impl ProcessSupervisor for Supervisor {
    async fn start(&self, descriptor: ServerDescriptor) {
        Supervisor::start(self, descriptor).await;
    }

    async fn stop(&self, server_id: &ServerId) {
        Supervisor::stop(self, server_id).await;
    }

    async fn check_status(&self, descriptor: ServerDescriptor) {
        Supervisor::check_status(self, descriptor).await;
    }

    async fn shutdown(&self) {
        Supervisor::shutdown(self).await;
    }

    fn status(&self, server_id: &ServerId) -> watch::Receiver<StatusRecord> {
        Supervisor::status(self, server_id)
    }

    fn all_statuses(&self) -> HashMap<ServerId, watch::Receiver<StatusRecord>> {
        Supervisor::all_statuses(self)
    }
}

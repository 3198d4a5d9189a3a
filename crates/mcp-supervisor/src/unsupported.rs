//! Stand-in for targets that cannot spawn processes.

use crate::{
    ConnectionState, ProcessSupervisor, ServerDescriptor, ServerId, StatusRecord, StatusRegistry,
    Supervisor, SupervisorError,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mcp_config::SupervisorConfig;
use tokio::sync::watch;
use tracing::debug;

/// Whether this target can launch child processes.
pub const PROCESS_SPAWNING_SUPPORTED: bool = !cfg!(any(target_os = "ios", target_os = "android"));

/// Supervisor for platforms without process spawning.
///
/// Every start or check ends in the same Error state; stop still reports
/// Disconnected.
#[derive(Clone, Default)]
pub struct UnsupportedSupervisor {
    registry: StatusRegistry,
}

impl UnsupportedSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    fn reject(&self, server_id: &ServerId) {
        debug!(server_id = %server_id, "Process spawning unsupported on this platform");
        self.registry.set(
            server_id,
            ConnectionState::Error(SupervisorError::unsupported().diagnostic()),
        );
    }
}

#[async_trait]
impl ProcessSupervisor for UnsupportedSupervisor {
    async fn start(&self, descriptor: ServerDescriptor) {
        self.reject(&descriptor.id);
    }

    async fn stop(&self, server_id: &ServerId) {
        self.registry.set(server_id, ConnectionState::disconnected());
    }

    async fn check_status(&self, descriptor: ServerDescriptor) {
        self.reject(&descriptor.id);
    }

    async fn shutdown(&self) {
        self.registry.close();
    }

    fn status(&self, server_id: &ServerId) -> watch::Receiver<StatusRecord> {
        self.registry.get(server_id)
    }

    fn all_statuses(&self) -> HashMap<ServerId, watch::Receiver<StatusRecord>> {
        self.registry.get_all()
    }
}

/// The supervisor implementation for the current target.
pub fn platform_supervisor(config: SupervisorConfig) -> Arc<dyn ProcessSupervisor> {
    if PROCESS_SPAWNING_SUPPORTED {
        Arc::new(Supervisor::new(config))
    } else {
        Arc::new(UnsupportedSupervisor::new())
    }
}

//! Managed process supervisor.
//!
//! Launches external helper servers from declarative descriptors, keeps
//! their output pipes drained, watches for exit and publishes a live
//! per-server [`ConnectionState`] through the [`StatusRegistry`].

pub mod availability;
pub mod connection_state;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod output_drain;
pub mod process_exit;
pub mod process_supervisor;
pub mod server_descriptor;
pub mod server_id;
pub mod status_record;
pub mod status_registry;
pub mod supervisor;
pub mod unsupported;

mod exit_watcher;
mod process_handle;
mod process_table;
mod task_guard;

pub use availability::is_available;
pub use connection_state::{
    ConnectionState, DISABLED_MESSAGE, PROCESS_EXITED_MESSAGE, SHUTDOWN_MESSAGE,
};
pub use error::{Result as SupervisorResult, SupervisorError};
pub use launcher::{Launcher, NativeLauncher, validate_command};
pub use logging::setup_logging;
pub use output_drain::OutputTail;
pub use process_exit::ProcessExit;
pub use process_supervisor::ProcessSupervisor;
pub use server_descriptor::ServerDescriptor;
pub use server_id::ServerId;
pub use status_record::StatusRecord;
pub use status_registry::StatusRegistry;
pub use supervisor::Supervisor;
pub use unsupported::{PROCESS_SPAWNING_SUPPORTED, UnsupportedSupervisor, platform_supervisor};

#[cfg(test)]
mod tests;

//! Builds and spawns the native child process for a descriptor.

use crate::{ServerDescriptor, SupervisorError, SupervisorResult, availability};

use std::io::ErrorKind;
use std::panic::Location;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use error_location::ErrorLocation;
use tokio::process::{Child, Command};
use tracing::info;

#[cfg(unix)]
const ENOEXEC: i32 = nix::errno::Errno::ENOEXEC as i32;
#[cfg(windows)]
const ERROR_BAD_EXE_FORMAT: i32 = 193;

/// Seam between the supervisor and the operating system.
///
/// The supervisor only talks to processes through this trait, so tests can
/// observe or replace launches.
pub trait Launcher: Send + Sync + 'static {
    /// Synchronous availability probe; called from a blocking worker.
    fn is_available(&self, command: &str, timeout: Duration) -> bool {
        availability::is_available(command, timeout)
    }

    /// Spawn the process with stdin, stdout and stderr piped.
    fn launch(&self, descriptor: &ServerDescriptor) -> SupervisorResult<Child>;
}

/// Spawns real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLauncher;

impl Launcher for NativeLauncher {
    fn launch(&self, descriptor: &ServerDescriptor) -> SupervisorResult<Child> {
        validate_command(&descriptor.command)?;

        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args)
            .envs(&descriptor.env)
            // Held open by the supervisor so stdio servers don't see EOF.
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination reaches wrapper scripts' children.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::{
                CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW,
            };
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }

        let child = cmd
            .spawn()
            .map_err(|e| classify_spawn_error(&descriptor.command, e))?;

        info!(
            server_id = %descriptor.id,
            pid = child.id(),
            "Launched '{}' with {} argument(s)",
            descriptor.command,
            descriptor.args.len()
        );

        Ok(child)
    }
}

/// Reject commands that cannot be launched as written.
///
/// Whitespace inside the command usually means arguments were typed into
/// the command field. A path that really contains spaces is accepted when
/// it exists.
#[track_caller]
pub fn validate_command(command: &str) -> SupervisorResult<()> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(SupervisorError::EmptyCommand {
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if trimmed.chars().any(char::is_whitespace) && !Path::new(trimmed).exists() {
        return Err(SupervisorError::CommandMalformed {
            command: command.to_string(),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(())
}

/// Map a spawn failure onto one of the launch error categories.
#[track_caller]
pub fn classify_spawn_error(command: &str, source: std::io::Error) -> SupervisorError {
    let location = ErrorLocation::from(Location::caller());
    let command = command.to_string();

    match source.kind() {
        ErrorKind::NotFound => SupervisorError::CommandNotFound { command, location },
        ErrorKind::PermissionDenied => SupervisorError::PermissionDenied {
            command,
            source,
            location,
        },
        _ if is_exec_format_error(&source) => SupervisorError::CannotExecute {
            command,
            source,
            location,
        },
        _ => SupervisorError::Io { source, location },
    }
}

fn is_exec_format_error(source: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        source.raw_os_error() == Some(ENOEXEC)
    }
    #[cfg(windows)]
    {
        source.raw_os_error() == Some(ERROR_BAD_EXE_FORMAT)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = source;
        false
    }
}

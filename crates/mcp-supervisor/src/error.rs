use crate::ProcessExit;

use std::panic::Location;

use error_location::ErrorLocation;
use thiserror::Error;

/// Everything that can go wrong while bringing a server up or keeping it
/// alive.
///
/// None of these escape `start`/`stop`/`check_status`: they are rendered
/// with [`SupervisorError::diagnostic`] into an Error connection state.
/// The `Display` form carries the source location and is meant for logs.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Server id must not be empty {location}")]
    InvalidServerId { location: ErrorLocation },

    #[error("Launch command is empty {location}")]
    EmptyCommand { location: ErrorLocation },

    #[error("Command '{command}' contains embedded arguments {location}")]
    CommandMalformed {
        command: String,
        location: ErrorLocation,
    },

    #[error("Command '{command}' not found {location}")]
    CommandNotFound {
        command: String,
        location: ErrorLocation,
    },

    #[error("Permission denied executing '{command}': {source} {location}")]
    PermissionDenied {
        command: String,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Cannot execute '{command}': {source} {location}")]
    CannotExecute {
        command: String,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Process exited too quickly ({exit}) {location}")]
    ExitedTooQuickly {
        exit: ProcessExit,
        output: Option<String>,
        location: ErrorLocation,
    },

    #[error("Process exited unsuccessfully ({exit}) {location}")]
    NonZeroExit {
        exit: ProcessExit,
        output: Option<String>,
        location: ErrorLocation,
    },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Process management is unsupported on this platform {location}")]
    Unsupported { location: ErrorLocation },
}

impl SupervisorError {
    #[track_caller]
    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn exited_too_quickly(exit: ProcessExit, output: Option<String>) -> Self {
        Self::ExitedTooQuickly {
            exit,
            output,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn non_zero_exit(exit: ProcessExit, output: Option<String>) -> Self {
        Self::NonZeroExit {
            exit,
            output,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unsupported() -> Self {
        Self::Unsupported {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// User-facing message published in the Error connection state.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::InvalidServerId { .. } => "Server id must not be empty".into(),
            Self::EmptyCommand { .. } => "No launch command is configured for this server".into(),
            Self::CommandMalformed { command, .. } => format!(
                "Command '{command}' contains arguments; split them into the argument list"
            ),
            Self::CommandNotFound { command, .. } => {
                format!("Command '{command}' was not found on the search path")
            }
            Self::PermissionDenied { command, .. } => {
                format!("Permission denied when running '{command}'")
            }
            Self::CannotExecute {
                command, source, ..
            } => format!("'{command}' was found but cannot be executed: {source}"),
            Self::ExitedTooQuickly { exit, output, .. } => {
                let mut message = String::from("Process exited too quickly");
                if !exit.success() {
                    message.push_str(&format!(" ({exit})"));
                }
                with_output(message, output.as_deref())
            }
            Self::NonZeroExit { exit, output, .. } => {
                with_output(format!("Process exited with {exit}"), output.as_deref())
            }
            Self::Io { source, .. } => format!("Unexpected I/O error: {source}"),
            Self::Unsupported { .. } => "Process management is unsupported on this platform".into(),
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::EmptyCommand { .. } => "Enter the executable to launch in the command field.",
            Self::CommandMalformed { .. } => {
                "Put only the executable in the command field \
                   and move each flag or value into the argument list."
            }
            Self::CommandNotFound { .. } => {
                "Install the command or use its absolute path. \
                   Applications started from a desktop may not share your shell's PATH."
            }
            Self::PermissionDenied { .. } => {
                "Make the file executable (chmod +x) or check its ownership."
            }
            Self::CannotExecute { .. } => {
                "The file is not a valid program for this platform. \
                   Check the architecture or add an interpreter as the command."
            }
            Self::ExitedTooQuickly { .. } => {
                "The server started but stopped immediately. \
                   Check its arguments and environment variables."
            }
            Self::NonZeroExit { .. } => "The server crashed. Check the logs for its output.",
            Self::Unsupported { .. } => "Local servers cannot run on this device.",
            _ => "An unexpected error occurred. Please check the logs for details.",
        }
    }

    /// Whether the error happened before the process was running.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyCommand { .. }
                | Self::CommandMalformed { .. }
                | Self::CommandNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::CannotExecute { .. }
        )
    }
}

fn with_output(mut message: String, output: Option<&str>) -> String {
    if let Some(line) = output {
        message.push_str(": ");
        message.push_str(line);
    }
    message
}

impl From<std::io::Error> for SupervisorError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

use serde::Serialize;

pub const DISABLED_MESSAGE: &str = "server disabled";
pub const PROCESS_EXITED_MESSAGE: &str = "process exited";
pub const SHUTDOWN_MESSAGE: &str = "supervisor shut down";

/// Connectivity of one managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not running, optionally with the reason
    Disconnected(Option<String>),
    /// Launch in progress or waiting out the grace period
    Connecting,
    /// Process alive past the grace period
    Connected,
    /// Launch failed or the process died; carries the diagnostic
    Error(String),
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self::Disconnected(None)
    }

    pub fn disconnected_because(reason: impl Into<String>) -> Self {
        Self::Disconnected(Some(reason.into()))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Disconnected(reason) => reason.as_deref(),
            Self::Error(message) => Some(message),
            Self::Connecting | Self::Connected => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected(_) => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error(_) => "error",
        }
    }
}

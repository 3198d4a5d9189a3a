use crate::{ConnectionState, ServerId};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current status of one server as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub server_id: ServerId,
    #[serde(flatten)]
    pub state: ConnectionState,
    pub updated_at: DateTime<Utc>,
    /// Position in the registry's write order; 0 until published.
    #[serde(skip)]
    pub sequence: u64,
}

impl StatusRecord {
    pub fn new(server_id: ServerId, state: ConnectionState) -> Self {
        Self {
            server_id,
            state,
            updated_at: Utc::now(),
            sequence: 0,
        }
    }

    /// Record for a server nothing has been published for yet.
    pub fn unknown(server_id: ServerId) -> Self {
        Self::new(server_id, ConnectionState::disconnected())
    }

    pub fn message(&self) -> Option<&str> {
        self.state.message()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, ConnectionState::Error(_))
    }
}

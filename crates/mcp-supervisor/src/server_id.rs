use crate::SupervisorError;

use std::borrow::Borrow;
use std::fmt;
use std::panic::Location;

use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};

/// Identity of a managed server.
///
/// Never empty: an empty id is a caller bug, so it is rejected when the id
/// is built rather than when a request arrives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    #[track_caller]
    pub fn new(value: impl Into<String>) -> Result<Self, SupervisorError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(SupervisorError::InvalidServerId {
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerId {
    type Error = SupervisorError;

    #[track_caller]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        id.0
    }
}

impl Borrow<str> for ServerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

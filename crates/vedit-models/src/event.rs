//! Event envelope carried through the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::request::TransformRequest;

/// Correlation identifier of an event.
///
/// Threaded through emission, consumption, invocation and the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work: one accepted transformation request.
///
/// The serialized shape (`id`, `editor_request`) is the wire format on the
/// broker and must stay stable across versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "editor_request")]
    pub request: TransformRequest,
}

impl Event {
    /// Create an event with a freshly generated ID.
    pub fn new(request: TransformRequest) -> Self {
        Self {
            id: EventId::new(),
            request,
        }
    }

    /// Create an event with a caller-supplied ID.
    pub fn with_id(id: impl Into<String>, request: TransformRequest) -> Self {
        Self {
            id: EventId::from_string(id),
            request,
        }
    }
}

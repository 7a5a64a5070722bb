//! Webhook notification payload.

use serde::{Deserialize, Serialize};

use crate::event::EventId;

/// Final status reported to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Success,
    Error,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Success => "success",
            WebhookStatus::Error => "error",
        }
    }
}

/// Body POSTed to the caller's webhook URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    pub id: EventId,
    #[serde(rename = "file_location", default, skip_serializing_if = "Vec::is_empty")]
    pub file_locations: Vec<String>,
    #[serde(rename = "error_msg", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WebhookResponse {
    pub fn success(id: EventId, file_locations: Vec<String>) -> Self {
        Self {
            status: WebhookStatus::Success,
            id,
            file_locations,
            error_message: None,
        }
    }

    pub fn error(id: EventId, message: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Error,
            id,
            file_locations: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

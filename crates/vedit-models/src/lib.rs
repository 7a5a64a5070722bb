//! Shared data models for the vedit transformation service.
//!
//! This crate provides Serde-serializable types for:
//! - The event envelope carried by every transport
//! - Transformation requests and their validation rules
//! - Webhook notification payloads

pub mod event;
pub mod request;
pub mod webhook;

pub use event::{Event, EventId};
pub use request::{Input, Output, TransformRequest};
pub use webhook::{WebhookResponse, WebhookStatus};

// Re-exported so callers can run `request.validate()` without a direct dependency.
pub use validator::{Validate, ValidationErrors};

//! Application state.

use std::sync::Arc;

use vedit_queue::EventEmitter;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub emitter: Arc<dyn EventEmitter>,
}

impl AppState {
    pub fn new(config: ApiConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { config, emitter }
    }
}

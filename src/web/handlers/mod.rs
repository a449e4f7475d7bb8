//! API handlers.

pub mod upload;

pub use upload::*;

use std::sync::Arc;

use crate::upload::UploadOrchestrator;

/// Shared state for request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Upload orchestrator (owns the admission controller).
    pub orchestrator: Arc<UploadOrchestrator>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(orchestrator: Arc<UploadOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

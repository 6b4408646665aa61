use std::sync::Arc;

use handoff_bus::EventBus;
use handoff_core::Orchestrator;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation entry point; also owns the session and ticket stores
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<EventBus>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, bus: Arc<EventBus>) -> Self {
        Self { orchestrator, bus }
    }
}

use crate::control::InputController;
use crate::session::StreamingSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Gesture front-end for the one session this host drives
    pub controller: Arc<InputController>,
}

impl AppState {
    pub fn new(controller: Arc<InputController>) -> Self {
        Self { controller }
    }

    pub fn session(&self) -> &Arc<StreamingSession> {
        self.controller.session()
    }
}

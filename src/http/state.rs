use crate::session::StreamingController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single streaming controller this process drives
    pub controller: Arc<StreamingController>,
}

impl AppState {
    pub fn new(controller: Arc<StreamingController>) -> Self {
        Self { controller }
    }
}

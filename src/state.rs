//! Shared application state for all routes.

use crate::model::Suite;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Immutable after build; shared by every request.
    pub suite: Arc<Suite>,
}

impl AppState {
    pub fn new(suite: Arc<Suite>) -> Self {
        AppState { suite }
    }
}

//! HTTP API and embedded chat page

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::controller::ProductionController;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: ProductionController,
}

impl AppState {
    pub fn new(controller: ProductionController) -> Self {
        Self { controller }
    }
}

//! Shared request-handler state.

use crate::config::Config;
use crate::worker::WorkerBoundary;

/// Owned by the router as `Arc<AppState>`. The boundary is constructed by the
/// caller so tests can inject their own data.
pub struct AppState {
    boundary: WorkerBoundary,
    config: Config,
}

impl AppState {
    pub fn new(boundary: WorkerBoundary, config: Config) -> Self {
        Self { boundary, config }
    }

    pub fn boundary(&self) -> &WorkerBoundary {
        &self.boundary
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

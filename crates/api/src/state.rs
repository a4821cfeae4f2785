use std::sync::Arc;

use swimlens_worker::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Accepts uploads and answers status queries.
    pub orchestrator: Arc<Orchestrator>,
}

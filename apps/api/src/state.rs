use crate::config::Config;
use crate::generation::generator::PitchGenerator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator with its completion client and result cache.
    pub generator: PitchGenerator,
    pub config: Config,
}

//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::probe::ProbeService;

/// Shared application state, cloneable across handlers.
///
/// The probe service owns the concurrency pool, which is the only state
/// shared between requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub probe: ProbeService,
}

impl AppState {
    /// Creates the application state and the probe service described by `config`.
    pub fn new(config: AppConfig) -> Self {
        let probe = ProbeService::from_config(&config);
        Self {
            config: Arc::new(config),
            probe,
        }
    }
}
